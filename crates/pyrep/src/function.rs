//! Functions and bound methods.
//!
//! A [`Function`] is the value stored in a type dictionary for a method. Its
//! body is either one native closure or one closure per host representation,
//! in which case the body chosen for a receiver is the first whose host class
//! the receiver's host class is assignable to.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use smallvec::SmallVec;

use crate::{
    exception::{ExcType, RunResult},
    host::HostClass,
    runtime::Runtime,
    slot::NativeFn,
    types::{TypeObject, TypeRef},
    value::Value,
};

/// Body of a [`Function`].
#[derive(Clone)]
pub enum FunctionBody {
    /// One implementation for every receiver.
    Native(NativeFn),
    /// One implementation per host representation, canonical first.
    PerRepresentation(SmallVec<[(HostClass, NativeFn); 2]>),
}

/// A callable stored as a type attribute.
///
/// Functions declared on a type through [`TypeSpec`](crate::TypeSpec) remember
/// that type (weakly) and refuse to bind to receivers that are not instances
/// of it. Functions assigned later by guest code bind to anything.
pub struct Function {
    name: Arc<str>,
    objclass: OnceLock<Weak<TypeObject>>,
    body: FunctionBody,
}

impl Function {
    pub fn new(name: &str, body: NativeFn) -> Self {
        Self {
            name: name.into(),
            objclass: OnceLock::new(),
            body: FunctionBody::Native(body),
        }
    }

    pub fn per_representation(name: &str, bodies: impl IntoIterator<Item = (HostClass, NativeFn)>) -> Self {
        Self {
            name: name.into(),
            objclass: OnceLock::new(),
            body: FunctionBody::PerRepresentation(bodies.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    /// The type this function was declared on, if it was declared through a `TypeSpec`.
    #[must_use]
    pub fn objclass(&self) -> Option<TypeRef> {
        self.objclass.get().and_then(Weak::upgrade)
    }

    pub(crate) fn bind_objclass(&self, ty: &TypeRef) {
        // first declaration wins; re-exporting a function does not move it
        let _ = self.objclass.set(Arc::downgrade(ty));
    }

    /// The implementation to run for receivers of host class `host`.
    #[must_use]
    pub fn body_for(&self, host: &HostClass) -> Option<NativeFn> {
        match &self.body {
            FunctionBody::Native(f) => Some(Arc::clone(f)),
            FunctionBody::PerRepresentation(bodies) => bodies
                .iter()
                .find(|(class, _)| host.is_assignable_to(class))
                .map(|(_, f)| Arc::clone(f)),
        }
    }

    /// Rejects receivers that are not instances of the declaring type.
    pub(crate) fn check_receiver(&self, rt: &Runtime, receiver: &Value) -> RunResult<()> {
        let Some(owner) = self.objclass() else {
            return Ok(());
        };
        let ty = rt.type_of(receiver)?;
        if ty.is_subtype(&owner) {
            Ok(())
        } else {
            Err(ExcType::descriptor_mismatch(&self.name, owner.name(), ty.name()))
        }
    }

    /// Calls the function with `args`, the receiver (if any) first.
    pub fn call(&self, rt: &Runtime, args: &[Value]) -> RunResult<Value> {
        match &self.body {
            FunctionBody::Native(f) => f(rt, args),
            FunctionBody::PerRepresentation(_) => {
                let Some(receiver) = args.first() else {
                    return Err(ExcType::type_error(format!(
                        "descriptor '{}' needs an argument",
                        self.name
                    )));
                };
                let host = rt.host_class_of(receiver)?;
                match self.body_for(&host) {
                    Some(f) => f(rt, args),
                    None => {
                        let owner = self.objclass().map_or_else(|| "object".into(), |t| t.name_arc());
                        Err(ExcType::descriptor_mismatch(
                            &self.name,
                            &owner,
                            rt.type_of(receiver)?.name(),
                        ))
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// A function bound to its receiver by `function.__get__`.
#[derive(Debug)]
pub struct BoundMethod {
    func: Value,
    receiver: Value,
}

impl BoundMethod {
    #[must_use]
    pub fn new(func: Value, receiver: Value) -> Self {
        Self { func, receiver }
    }

    #[must_use]
    pub fn func(&self) -> &Value {
        &self.func
    }

    #[must_use]
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    /// Calls the underlying callable with the receiver prepended.
    pub fn call(&self, rt: &Runtime, args: &[Value]) -> RunResult<Value> {
        let mut full: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
        full.push(self.receiver.clone());
        full.extend(args.iter().cloned());
        match &self.func {
            Value::Function(f) => f.call(rt, &full),
            other => rt.call(other, &full),
        }
    }
}
