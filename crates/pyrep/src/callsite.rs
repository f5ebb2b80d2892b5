//! Inline-cached call sites.
//!
//! A [`CallSite`] starts generic. Every invocation computes the [`Shape`] of
//! its guarded arguments and walks a short chain of guards; a hit invokes the
//! cached target directly. A miss runs the generic resolution, counts it in
//! [`CallSite::fallback_calls`] and, once the call has succeeded, appends a
//! guard for the observed shapes.
//!
//! The chain is an immutable vector behind an `ArcSwap`, extended with `rcu`,
//! so readers never lock and a reader racing a writer keeps using the chain it
//! loaded. Targets hold operation sets rather than copied slot handles, which
//! is why reassigning a special method on a type needs no invalidation here.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arc_swap::ArcSwap;
use smallvec::SmallVec;

use crate::{
    dispatch::{BinaryTarget, CompareTarget, Comparison, InPlaceTarget, UnaryTarget},
    exception::{ExcType, RunError, RunResult},
    host::Shape,
    operation_set::OperationSet,
    resolver,
    runtime::Runtime,
    slot::Slot,
    value::Value,
};

/// What a call site does.
///
/// The first [`SiteKind::GUARDED`] arguments form the guard; `resolve` runs on
/// a miss and `invoke` on both paths, so a cached call behaves exactly like
/// an uncached one.
pub trait SiteKind: Send + Sync {
    type Target: Send + Sync;

    /// Short name used in traces.
    const NAME: &'static str;

    /// Number of leading arguments whose shapes are guarded.
    const GUARDED: usize;

    /// Validates the argument count before shapes are computed.
    fn check_args(&self, args: &[Value]) -> RunResult<()> {
        if args.len() == Self::GUARDED {
            Ok(())
        } else {
            Err(ExcType::arg_count(Self::NAME, Self::GUARDED, args.len()))
        }
    }

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<Self::Target>;

    fn invoke(&self, rt: &Runtime, target: &Self::Target, args: &[Value]) -> RunResult<Value>;
}

/// `op v`.
#[derive(Debug, Clone, Copy)]
pub struct UnaryOp(pub Slot);

impl SiteKind for UnaryOp {
    type Target = UnaryTarget;
    const NAME: &'static str = "unary";
    const GUARDED: usize = 1;

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<UnaryTarget> {
        UnaryTarget::resolve(rt, self.0, &args[0])
    }

    fn invoke(&self, rt: &Runtime, target: &UnaryTarget, args: &[Value]) -> RunResult<Value> {
        target.invoke(rt, &args[0])
    }
}

/// `v op w`.
#[derive(Debug, Clone, Copy)]
pub struct BinaryOp(pub Slot);

impl SiteKind for BinaryOp {
    type Target = BinaryTarget;
    const NAME: &'static str = "binary";
    const GUARDED: usize = 2;

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<BinaryTarget> {
        BinaryTarget::resolve(rt, self.0, &args[0], &args[1])
    }

    fn invoke(&self, rt: &Runtime, target: &BinaryTarget, args: &[Value]) -> RunResult<Value> {
        target.invoke(rt, &args[0], &args[1])
    }
}

/// `v op= w`.
#[derive(Debug, Clone, Copy)]
pub struct InPlaceOp(pub Slot);

impl SiteKind for InPlaceOp {
    type Target = InPlaceTarget;
    const NAME: &'static str = "inplace";
    const GUARDED: usize = 2;

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<InPlaceTarget> {
        InPlaceTarget::resolve(rt, self.0, &args[0], &args[1])
    }

    fn invoke(&self, rt: &Runtime, target: &InPlaceTarget, args: &[Value]) -> RunResult<Value> {
        target.invoke(rt, &args[0], &args[1])
    }
}

/// `v < w` and friends.
#[derive(Debug, Clone, Copy)]
pub struct RichCompare(pub Comparison);

impl SiteKind for RichCompare {
    type Target = CompareTarget;
    const NAME: &'static str = "compare";
    const GUARDED: usize = 2;

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<CompareTarget> {
        CompareTarget::resolve(rt, self.0, &args[0], &args[1])
    }

    fn invoke(&self, rt: &Runtime, target: &CompareTarget, args: &[Value]) -> RunResult<Value> {
        target.invoke(rt, &args[0], &args[1])
    }
}

/// `obj.name` for a fixed name.
#[derive(Debug, Clone)]
pub struct GetAttr {
    name: Value,
}

impl GetAttr {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Value::Str(name.into()),
        }
    }
}

impl SiteKind for GetAttr {
    type Target = Arc<OperationSet>;
    const NAME: &'static str = "getattr";
    const GUARDED: usize = 1;

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<Arc<OperationSet>> {
        rt.ops_of(&args[0])
    }

    fn invoke(&self, rt: &Runtime, target: &Arc<OperationSet>, args: &[Value]) -> RunResult<Value> {
        resolver::get_attr_in(rt, target, &args[0], &self.name)
    }
}

/// `f(*args)`; the callable is the first argument and the only one guarded.
#[derive(Debug, Clone, Copy)]
pub struct Invoke;

impl SiteKind for Invoke {
    type Target = Arc<OperationSet>;
    const NAME: &'static str = "call";
    const GUARDED: usize = 1;

    fn check_args(&self, args: &[Value]) -> RunResult<()> {
        if args.is_empty() {
            Err(ExcType::type_error("call site invoked without a callable"))
        } else {
            Ok(())
        }
    }

    fn resolve(&self, rt: &Runtime, args: &[Value]) -> RunResult<Arc<OperationSet>> {
        rt.ops_of(&args[0])
    }

    fn invoke(&self, rt: &Runtime, target: &Arc<OperationSet>, args: &[Value]) -> RunResult<Value> {
        match target.handle(Slot::Call).invoke(rt, args) {
            Err(RunError::EmptySlot) => Err(RunError::NotCallable {
                type_name: rt.type_of(&args[0])?.name_arc(),
            }),
            result => result,
        }
    }
}

type Shapes = SmallVec<[Shape; 2]>;

struct Guard<T> {
    shapes: Shapes,
    target: T,
}

/// An inline-cached call site.
///
/// ```
/// use pyrep::{BinaryOp, CallSite, Runtime, Slot, Value};
///
/// let rt = Runtime::default();
/// let site = CallSite::new(BinaryOp(Slot::Add));
/// for i in 0..3 {
///     site.invoke(&rt, &[Value::Int(i), Value::Int(1)]).unwrap();
/// }
/// assert_eq!(site.fallback_calls(), 1);
/// ```
pub struct CallSite<K: SiteKind> {
    kind: K,
    chain: ArcSwap<Vec<Arc<Guard<K::Target>>>>,
    fallback_calls: AtomicUsize,
}

impl<K: SiteKind> CallSite<K> {
    #[must_use]
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            chain: ArcSwap::from_pointee(Vec::new()),
            fallback_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Number of invocations that missed every guard.
    #[must_use]
    pub fn fallback_calls(&self) -> usize {
        self.fallback_calls.load(Ordering::Relaxed)
    }

    /// Number of guards currently installed.
    #[must_use]
    pub fn guard_count(&self) -> usize {
        self.chain.load().len()
    }

    pub fn invoke(&self, rt: &Runtime, args: &[Value]) -> RunResult<Value> {
        self.kind.check_args(args)?;
        let shapes: Shapes = args[..K::GUARDED].iter().map(Value::shape).collect();
        {
            let chain = self.chain.load();
            if let Some(guard) = chain.iter().find(|guard| guard.shapes == shapes) {
                return self.kind.invoke(rt, &guard.target, args);
            }
        }
        self.fallback(rt, args, shapes)
    }

    fn fallback(&self, rt: &Runtime, args: &[Value], shapes: Shapes) -> RunResult<Value> {
        let calls = self.fallback_calls.fetch_add(1, Ordering::Relaxed) + 1;
        rt.tracer().on_site_fallback(K::NAME, calls);
        let target = self.kind.resolve(rt, args)?;
        let result = self.kind.invoke(rt, &target, args)?;
        self.install(rt, shapes, target);
        Ok(result)
    }

    fn install(&self, rt: &Runtime, shapes: Shapes, target: K::Target) {
        let limit = rt.config().max_guard_chain;
        let guard = Arc::new(Guard { shapes, target });
        let mut installed = None;
        self.chain.rcu(|chain| {
            installed = None;
            if chain.len() >= limit || chain.iter().any(|g| g.shapes == guard.shapes) {
                return Arc::clone(chain);
            }
            let mut next = Vec::with_capacity(chain.len() + 1);
            next.extend(chain.iter().cloned());
            next.push(Arc::clone(&guard));
            installed = Some(next.len());
            Arc::new(next)
        });
        if let Some(chain_len) = installed {
            rt.tracer().on_guard_installed(K::NAME, chain_len);
        }
    }
}

impl<K: SiteKind + std::fmt::Debug> std::fmt::Debug for CallSite<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("kind", &self.kind)
            .field("guards", &self.guard_count())
            .field("fallback_calls", &self.fallback_calls())
            .finish()
    }
}
