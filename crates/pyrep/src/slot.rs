//! Special-method slots and the per-representation slot table.
//!
//! Every special method has its own [`Slot`]. Forward, reflected and in-place
//! forms of a binary operator are separate slots, so filling one never fills
//! another and dispatch can never consult a method the operator does not name.

use std::sync::{Arc, LazyLock};

use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    exception::{RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

/// A native function body: receives the runtime and positional arguments,
/// with the receiver (if any) first.
pub type NativeFn = Arc<dyn Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync>;

/// Wraps a closure as a [`NativeFn`].
///
/// Going through this function lets closures infer the higher-ranked signature.
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One special method.
///
/// The strum string form of every variant is its Python method name, so
/// `Slot::from_str("__radd__")` finds the slot a dictionary key fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter, EnumCount)]
pub enum Slot {
    #[strum(serialize = "__repr__")]
    Repr,
    #[strum(serialize = "__str__")]
    Str,
    #[strum(serialize = "__hash__")]
    Hash,
    #[strum(serialize = "__bool__")]
    Bool,
    #[strum(serialize = "__len__")]
    Len,
    #[strum(serialize = "__call__")]
    Call,
    #[strum(serialize = "__init__")]
    Init,

    #[strum(serialize = "__getattribute__")]
    GetAttribute,
    #[strum(serialize = "__getattr__")]
    GetAttr,
    #[strum(serialize = "__setattr__")]
    SetAttr,
    #[strum(serialize = "__delattr__")]
    DelAttr,

    #[strum(serialize = "__get__")]
    Get,
    #[strum(serialize = "__set__")]
    Set,
    #[strum(serialize = "__delete__")]
    Delete,

    #[strum(serialize = "__lt__")]
    Lt,
    #[strum(serialize = "__le__")]
    Le,
    #[strum(serialize = "__eq__")]
    Eq,
    #[strum(serialize = "__ne__")]
    Ne,
    #[strum(serialize = "__gt__")]
    Gt,
    #[strum(serialize = "__ge__")]
    Ge,

    #[strum(serialize = "__neg__")]
    Neg,
    #[strum(serialize = "__pos__")]
    Pos,
    #[strum(serialize = "__abs__")]
    Abs,
    #[strum(serialize = "__invert__")]
    Invert,

    #[strum(serialize = "__add__")]
    Add,
    #[strum(serialize = "__sub__")]
    Sub,
    #[strum(serialize = "__mul__")]
    Mul,
    #[strum(serialize = "__truediv__")]
    TrueDiv,
    #[strum(serialize = "__floordiv__")]
    FloorDiv,
    #[strum(serialize = "__mod__")]
    Mod,
    #[strum(serialize = "__pow__")]
    Pow,
    #[strum(serialize = "__lshift__")]
    LShift,
    #[strum(serialize = "__rshift__")]
    RShift,
    #[strum(serialize = "__and__")]
    And,
    #[strum(serialize = "__xor__")]
    Xor,
    #[strum(serialize = "__or__")]
    Or,

    #[strum(serialize = "__radd__")]
    RAdd,
    #[strum(serialize = "__rsub__")]
    RSub,
    #[strum(serialize = "__rmul__")]
    RMul,
    #[strum(serialize = "__rtruediv__")]
    RTrueDiv,
    #[strum(serialize = "__rfloordiv__")]
    RFloorDiv,
    #[strum(serialize = "__rmod__")]
    RMod,
    #[strum(serialize = "__rpow__")]
    RPow,
    #[strum(serialize = "__rlshift__")]
    RLShift,
    #[strum(serialize = "__rrshift__")]
    RRShift,
    #[strum(serialize = "__rand__")]
    RAnd,
    #[strum(serialize = "__rxor__")]
    RXor,
    #[strum(serialize = "__ror__")]
    ROr,

    #[strum(serialize = "__iadd__")]
    IAdd,
    #[strum(serialize = "__isub__")]
    ISub,
    #[strum(serialize = "__imul__")]
    IMul,
    #[strum(serialize = "__itruediv__")]
    ITrueDiv,
    #[strum(serialize = "__ifloordiv__")]
    IFloorDiv,
    #[strum(serialize = "__imod__")]
    IMod,
    #[strum(serialize = "__ipow__")]
    IPow,
    #[strum(serialize = "__ilshift__")]
    ILShift,
    #[strum(serialize = "__irshift__")]
    IRShift,
    #[strum(serialize = "__iand__")]
    IAnd,
    #[strum(serialize = "__ixor__")]
    IXor,
    #[strum(serialize = "__ior__")]
    IOr,
}

/// Forward binary slots, in declaration order. Reflected and in-place slots
/// follow the same order, which the index arithmetic below relies on.
const FORWARD: [Slot; 12] = [
    Slot::Add,
    Slot::Sub,
    Slot::Mul,
    Slot::TrueDiv,
    Slot::FloorDiv,
    Slot::Mod,
    Slot::Pow,
    Slot::LShift,
    Slot::RShift,
    Slot::And,
    Slot::Xor,
    Slot::Or,
];

const REFLECTED: [Slot; 12] = [
    Slot::RAdd,
    Slot::RSub,
    Slot::RMul,
    Slot::RTrueDiv,
    Slot::RFloorDiv,
    Slot::RMod,
    Slot::RPow,
    Slot::RLShift,
    Slot::RRShift,
    Slot::RAnd,
    Slot::RXor,
    Slot::ROr,
];

const INPLACE: [Slot; 12] = [
    Slot::IAdd,
    Slot::ISub,
    Slot::IMul,
    Slot::ITrueDiv,
    Slot::IFloorDiv,
    Slot::IMod,
    Slot::IPow,
    Slot::ILShift,
    Slot::IRShift,
    Slot::IAnd,
    Slot::IXor,
    Slot::IOr,
];

const SYMBOLS: [&str; 12] = ["+", "-", "*", "/", "//", "%", "**", "<<", ">>", "&", "^", "|"];
const INPLACE_SYMBOLS: [&str; 12] = ["+=", "-=", "*=", "/=", "//=", "%=", "**=", "<<=", ">>=", "&=", "^=", "|="];

impl Slot {
    /// The Python method name that fills this slot, e.g. `"__add__"`.
    #[must_use]
    pub fn method_name(self) -> &'static str {
        self.into()
    }

    /// Position of this slot in a [`SlotTable`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    fn binary_position(self) -> Option<usize> {
        let idx = self.index();
        let first = Self::Add.index();
        (first..first + 3 * FORWARD.len())
            .contains(&idx)
            .then(|| (idx - first) % FORWARD.len())
    }

    #[must_use]
    pub fn is_forward_binary(self) -> bool {
        FORWARD.contains(&self)
    }

    #[must_use]
    pub fn is_reflected(self) -> bool {
        REFLECTED.contains(&self)
    }

    #[must_use]
    pub fn is_inplace(self) -> bool {
        INPLACE.contains(&self)
    }

    /// The reflected partner of a forward binary slot (`__add__` -> `__radd__`).
    #[must_use]
    pub fn reflected(self) -> Option<Self> {
        self.is_forward_binary()
            .then(|| self.binary_position().map(|pos| REFLECTED[pos]))
            .flatten()
    }

    /// The forward binary slot an in-place or reflected slot falls back to.
    #[must_use]
    pub fn binary_of(self) -> Option<Self> {
        self.binary_position().map(|pos| FORWARD[pos])
    }

    /// The in-place form of a forward binary slot (`__add__` -> `__iadd__`).
    #[must_use]
    pub fn inplace(self) -> Option<Self> {
        self.is_forward_binary()
            .then(|| self.binary_position().map(|pos| INPLACE[pos]))
            .flatten()
    }

    /// The operator as written in source, used in error messages.
    ///
    /// In-place slots render with the `=` suffix; unary slots without an
    /// operator render as a builtin call such as `abs()`.
    #[must_use]
    pub fn op_symbol(self) -> &'static str {
        if let Some(pos) = self.binary_position() {
            return if self.is_inplace() {
                INPLACE_SYMBOLS[pos]
            } else {
                SYMBOLS[pos]
            };
        }
        match self {
            Self::Neg => "-",
            Self::Pos => "+",
            Self::Invert => "~",
            Self::Abs => "abs()",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            other => other.method_name(),
        }
    }

    /// Iterates every slot.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

fn empty_slot(_rt: &Runtime, _args: &[Value]) -> RunResult<Value> {
    Err(RunError::EmptySlot)
}

static EMPTY: LazyLock<NativeFn> = LazyLock::new(|| Arc::new(empty_slot));

/// The callable stored in one slot of a [`SlotTable`].
///
/// An undefined slot holds a shared handle that fails with
/// [`RunError::EmptySlot`], so callers discover emptiness through the same
/// invocation path as a real call.
#[derive(Clone)]
pub struct SlotHandle {
    func: NativeFn,
    defined: bool,
}

impl SlotHandle {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            func: Arc::clone(&EMPTY),
            defined: false,
        }
    }

    #[must_use]
    pub fn new(func: NativeFn) -> Self {
        Self { func, defined: true }
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    #[inline]
    pub fn invoke(&self, rt: &Runtime, args: &[Value]) -> RunResult<Value> {
        (self.func)(rt, args)
    }
}

impl std::fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.defined { "SlotHandle(defined)" } else { "SlotHandle(empty)" })
    }
}

/// Immutable snapshot of every slot of one operation set.
#[derive(Debug, Clone)]
pub struct SlotTable {
    handles: Box<[SlotHandle]>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self {
            handles: (0..<Slot as EnumCount>::COUNT).map(|_| SlotHandle::empty()).collect(),
        }
    }
}

impl SlotTable {
    #[inline]
    #[must_use]
    pub fn get(&self, slot: Slot) -> &SlotHandle {
        &self.handles[slot.index()]
    }

    /// Returns a copy of this table with one slot replaced.
    #[must_use]
    pub fn with(&self, slot: Slot, handle: SlotHandle) -> Self {
        let mut handles = self.handles.clone();
        handles[slot.index()] = handle;
        Self { handles }
    }

    pub(crate) fn set(&mut self, slot: Slot, handle: SlotHandle) {
        self.handles[slot.index()] = handle;
    }

    /// A value whose table defines `__set__` or `__delete__` is a data descriptor.
    #[must_use]
    pub fn is_data_descriptor(&self) -> bool {
        self.get(Slot::Set).is_defined() || self.get(Slot::Delete).is_defined()
    }

    /// A value whose table defines `__get__` is at least a non-data descriptor.
    #[must_use]
    pub fn is_descriptor(&self) -> bool {
        self.is_data_descriptor() || self.get(Slot::Get).is_defined()
    }

    /// Slots that currently hold a defined handle.
    pub fn defined_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::iter().filter(|slot| self.get(*slot).is_defined())
    }
}
