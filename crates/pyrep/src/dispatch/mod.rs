//! Operator dispatch.
//!
//! Unary operators read one slot. Binary operators follow the forward /
//! reflected protocol: when the right operand's type is a proper subtype of
//! the left's, its reflected slot runs first; otherwise the left operand's
//! forward slot does. A `NotImplemented` result or an empty slot passes to the
//! next candidate and any other error propagates at once. Because forward,
//! reflected and in-place forms are distinct slots, nothing but the named
//! slot is ever consulted at each step.
//!
//! Each operation resolves to a target (operand types, operation sets, plan)
//! which is then invoked. Call sites cache the same targets, so a cached
//! invocation behaves exactly like the generic one.

mod compare;
pub mod grid;

use std::sync::Arc;

pub use self::compare::Comparison;
use self::grid::BinaryFn;
use crate::{
    exception::{RunError, RunResult},
    operation_set::OperationSet,
    runtime::Runtime,
    slot::Slot,
    tracer::DispatchPath,
    types::TypeRef,
    value::Value,
};

/// True when a slot result means "try the next candidate".
#[inline]
fn declined(result: &RunResult<Value>) -> bool {
    matches!(result, Ok(Value::NotImplemented) | Err(RunError::EmptySlot))
}

/// One candidate in a binary resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `v.__op__(w)`
    Forward,
    /// `w.__rop__(v)`
    Reflected,
}

/// Order in which binary candidates are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryPlan {
    /// Both operands have the same type.
    ForwardOnly,
    ForwardThenReflected,
    /// The right operand's type is a proper subtype of the left's.
    ReflectedThenForward,
}

impl BinaryPlan {
    #[must_use]
    pub fn for_types(lhs: &TypeRef, rhs: &TypeRef) -> Self {
        if Arc::ptr_eq(lhs, rhs) {
            Self::ForwardOnly
        } else if rhs.is_subtype(lhs) {
            Self::ReflectedThenForward
        } else {
            Self::ForwardThenReflected
        }
    }

    #[must_use]
    pub fn steps(self) -> &'static [Step] {
        match self {
            Self::ForwardOnly => &[Step::Forward],
            Self::ForwardThenReflected => &[Step::Forward, Step::Reflected],
            Self::ReflectedThenForward => &[Step::Reflected, Step::Forward],
        }
    }
}

/// A resolved unary operation.
#[derive(Debug, Clone)]
pub struct UnaryTarget {
    slot: Slot,
    ty: TypeRef,
    ops: Arc<OperationSet>,
}

impl UnaryTarget {
    pub fn resolve(rt: &Runtime, slot: Slot, v: &Value) -> RunResult<Self> {
        let (ty, ops) = rt.resolve_value(v)?;
        Ok(Self { slot, ty, ops })
    }

    pub fn invoke(&self, rt: &Runtime, v: &Value) -> RunResult<Value> {
        match self.ops.handle(self.slot).invoke(rt, std::slice::from_ref(v)) {
            Err(RunError::EmptySlot) => Err(RunError::UnaryOperandType {
                op: self.slot.op_symbol(),
                type_name: self.ty.name_arc(),
            }),
            result => result,
        }
    }
}

/// A resolved binary operation between two operand shapes.
#[derive(Clone)]
pub struct BinaryTarget {
    slot: Slot,
    reflected: Slot,
    lhs_type: TypeRef,
    rhs_type: TypeRef,
    lhs: Arc<OperationSet>,
    rhs: Arc<OperationSet>,
    plan: BinaryPlan,
    grid: Option<BinaryFn>,
}

impl BinaryTarget {
    /// Resolves `v op w` for a forward binary slot.
    pub fn resolve(rt: &Runtime, slot: Slot, v: &Value, w: &Value) -> RunResult<Self> {
        let Some(reflected) = slot.reflected() else {
            return Err(RunError::internal(format!("{slot} is not a forward binary slot")));
        };
        let (lhs_type, lhs) = rt.resolve_value(v)?;
        let (rhs_type, rhs) = rt.resolve_value(w)?;
        let plan = BinaryPlan::for_types(&lhs_type, &rhs_type);
        let grid = match (plan, lhs_type.grid()) {
            (BinaryPlan::ForwardOnly, Some(grid)) => grid.lookup(slot, &lhs, &rhs),
            _ => None,
        };
        Ok(Self {
            slot,
            reflected,
            lhs_type,
            rhs_type,
            lhs,
            rhs,
            plan,
            grid,
        })
    }

    #[must_use]
    pub fn plan(&self) -> BinaryPlan {
        self.plan
    }

    #[must_use]
    pub fn uses_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Runs the candidates in order; `None` when every one declined.
    pub fn try_invoke(&self, rt: &Runtime, v: &Value, w: &Value) -> RunResult<Option<Value>> {
        if let Some(f) = self.grid {
            rt.tracer().on_binary_dispatch(self.slot, DispatchPath::Grid);
            return f(rt, v, w).map(Some);
        }
        for step in self.plan.steps() {
            let (result, path) = match step {
                Step::Forward => (
                    self.lhs.handle(self.slot).invoke(rt, &[v.clone(), w.clone()]),
                    DispatchPath::Forward,
                ),
                Step::Reflected => (
                    self.rhs.handle(self.reflected).invoke(rt, &[w.clone(), v.clone()]),
                    DispatchPath::Reflected,
                ),
            };
            if !declined(&result) {
                rt.tracer().on_binary_dispatch(self.slot, path);
                return result.map(Some);
            }
        }
        Ok(None)
    }

    fn unsupported(&self, rt: &Runtime, op: &'static str) -> RunError {
        rt.tracer().on_binary_dispatch(self.slot, DispatchPath::Unsupported);
        RunError::OperandType {
            op,
            lhs: self.lhs_type.name_arc(),
            rhs: self.rhs_type.name_arc(),
        }
    }

    pub fn invoke(&self, rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
        match self.try_invoke(rt, v, w)? {
            Some(value) => Ok(value),
            None => Err(self.unsupported(rt, self.slot.op_symbol())),
        }
    }
}

impl std::fmt::Debug for BinaryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryTarget")
            .field("slot", &self.slot)
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .field("plan", &self.plan)
            .field("grid", &self.grid.is_some())
            .finish()
    }
}

/// A resolved in-place operation: the in-place slot, then the full binary resolution.
#[derive(Debug, Clone)]
pub struct InPlaceTarget {
    slot: Slot,
    binary: BinaryTarget,
}

impl InPlaceTarget {
    /// Resolves `v op= w` for an in-place slot such as `Slot::IAdd`.
    pub fn resolve(rt: &Runtime, slot: Slot, v: &Value, w: &Value) -> RunResult<Self> {
        let binary_slot = slot
            .binary_of()
            .filter(|_| slot.is_inplace())
            .ok_or_else(|| RunError::internal(format!("{slot} is not an in-place slot")))?;
        Ok(Self {
            slot,
            binary: BinaryTarget::resolve(rt, binary_slot, v, w)?,
        })
    }

    pub fn invoke(&self, rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
        let result = self.binary.lhs.handle(self.slot).invoke(rt, &[v.clone(), w.clone()]);
        if !declined(&result) {
            rt.tracer().on_binary_dispatch(self.slot, DispatchPath::InPlace);
            return result;
        }
        match self.binary.try_invoke(rt, v, w)? {
            Some(value) => Ok(value),
            None => Err(self.binary.unsupported(rt, self.slot.op_symbol())),
        }
    }
}

/// A resolved rich comparison.
#[derive(Debug, Clone)]
pub struct CompareTarget {
    op: Comparison,
    lhs_type: TypeRef,
    rhs_type: TypeRef,
    lhs: Arc<OperationSet>,
    rhs: Arc<OperationSet>,
    reflected_first: bool,
}

impl CompareTarget {
    pub fn resolve(rt: &Runtime, op: Comparison, v: &Value, w: &Value) -> RunResult<Self> {
        let (lhs_type, lhs) = rt.resolve_value(v)?;
        let (rhs_type, rhs) = rt.resolve_value(w)?;
        let reflected_first = !Arc::ptr_eq(&lhs_type, &rhs_type) && rhs_type.is_subtype(&lhs_type);
        Ok(Self {
            op,
            lhs_type,
            rhs_type,
            lhs,
            rhs,
            reflected_first,
        })
    }

    pub fn invoke(&self, rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
        let swapped = self.op.swapped().slot();
        if self.reflected_first {
            let result = self.rhs.handle(swapped).invoke(rt, &[w.clone(), v.clone()]);
            if !declined(&result) {
                return result;
            }
        }
        let result = self.lhs.handle(self.op.slot()).invoke(rt, &[v.clone(), w.clone()]);
        if !declined(&result) {
            return result;
        }
        if !self.reflected_first {
            let result = self.rhs.handle(swapped).invoke(rt, &[w.clone(), v.clone()]);
            if !declined(&result) {
                return result;
            }
        }
        match self.op {
            Comparison::Eq => Ok(Value::Bool(v.is(w))),
            Comparison::Ne => Ok(Value::Bool(!v.is(w))),
            op => Err(RunError::Unorderable {
                op: op.symbol(),
                lhs: self.lhs_type.name_arc(),
                rhs: self.rhs_type.name_arc(),
            }),
        }
    }
}

/// `op v` for `Slot::Neg`, `Slot::Pos`, `Slot::Invert` or `Slot::Abs`.
pub fn invoke_unary(rt: &Runtime, slot: Slot, v: &Value) -> RunResult<Value> {
    UnaryTarget::resolve(rt, slot, v)?.invoke(rt, v)
}

/// `v op w` for a forward binary slot.
pub fn invoke_binary(rt: &Runtime, slot: Slot, v: &Value, w: &Value) -> RunResult<Value> {
    BinaryTarget::resolve(rt, slot, v, w)?.invoke(rt, v, w)
}

/// `v op= w` for an in-place slot.
pub fn invoke_inplace(rt: &Runtime, slot: Slot, v: &Value, w: &Value) -> RunResult<Value> {
    InPlaceTarget::resolve(rt, slot, v, w)?.invoke(rt, v, w)
}

/// Rich comparison `v op w`.
pub fn compare(rt: &Runtime, op: Comparison, v: &Value, w: &Value) -> RunResult<Value> {
    CompareTarget::resolve(rt, op, v, w)?.invoke(rt, v, w)
}
