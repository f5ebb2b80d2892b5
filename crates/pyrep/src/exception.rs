use std::{
    borrow::Cow,
    fmt::{self, Display},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Python exception classes that dispatch errors map onto.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Attribute lookup, assignment or deletion failed.
    AttributeError,
    /// An operation was applied to operands of unsupported types.
    TypeError,
    /// An argument had the right type but an unacceptable value.
    ValueError,
    /// Division or modulo by zero.
    ZeroDivisionError,
    /// A numeric result could not be represented.
    OverflowError,
    /// Generic runtime failure, also used to surface internal errors.
    RuntimeError,
}

impl ExcType {
    /// Creates a TypeError with the given message.
    #[must_use]
    pub fn type_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    /// Creates a ValueError with the given message.
    #[must_use]
    pub fn value_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    /// Creates a guest-level AttributeError with a free-form message.
    ///
    /// Missing attributes found by the resolver use [`RunError::NoSuchAttribute`]
    /// instead; this constructor is for errors raised by guest code.
    #[must_use]
    pub fn attribute_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::AttributeError, msg).into()
    }

    /// Creates a ZeroDivisionError.
    ///
    /// Matches CPython's messages for `/`, `//` and `%`.
    #[must_use]
    pub fn zero_division(op: &str) -> RunError {
        let msg = match op {
            "/" => "division by zero",
            "%" => "integer modulo by zero",
            _ => "integer division or modulo by zero",
        };
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    /// Creates an OverflowError with the given message.
    #[must_use]
    pub fn overflow_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::OverflowError, msg).into()
    }

    /// Creates a TypeError for a descriptor applied to the wrong kind of receiver.
    ///
    /// Matches CPython's format: `descriptor 'x' for 'T' objects doesn't apply to a 'U' object`.
    #[must_use]
    pub fn descriptor_mismatch(name: &str, owner: &str, received: &str) -> RunError {
        Self::type_error(format!(
            "descriptor '{name}' for '{owner}' objects doesn't apply to a '{received}' object"
        ))
    }

    /// Creates a TypeError for a call with the wrong number of positional arguments.
    #[must_use]
    pub fn arg_count(name: &str, expected: usize, given: usize) -> RunError {
        let plural = if expected == 1 { "" } else { "s" };
        Self::type_error(format!(
            "{name}() takes {expected} positional argument{plural} but {given} were given"
        ))
    }
}

/// Exception raised by guest code or by a built-in operation.
///
/// Carries the exception class and an optional message; there is no traceback
/// because the dispatch core has no frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: {arg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

impl SimpleException {
    /// Creates a new exception with the given type and optional argument message.
    #[must_use]
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self { exc_type, arg }
    }

    /// Creates a new exception with a message.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl Display) -> Self {
        Self {
            exc_type,
            arg: Some(msg.to_string()),
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

/// Errors produced by attribute resolution and operator dispatch.
///
/// Structured variants carry the names a caller needs to render CPython's
/// wording; `Exc` wraps an exception raised by guest code; `EmptySlot` is the
/// internal signal produced by invoking an undefined slot and never escapes
/// the public dispatch entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Attribute not found on an instance (`on_type == false`) or a type object.
    NoSuchAttribute {
        type_name: Arc<str>,
        name: Arc<str>,
        on_type: bool,
    },
    /// Assignment through a data descriptor that has no setter, or to frozen storage.
    ReadOnlyAttribute { type_name: Arc<str>, name: Arc<str> },
    /// Deletion through a data descriptor that has no deleter.
    UndeletableAttribute { type_name: Arc<str>, name: Arc<str> },
    /// Read of a data descriptor whose type defines no `__get__`.
    UnreadableAttribute { type_name: Arc<str>, name: Arc<str> },
    /// Attribute name given as a non-`str` value.
    WrongNameType { type_name: Arc<str> },
    /// Binary operator with no applicable implementation.
    OperandType {
        op: &'static str,
        lhs: Arc<str>,
        rhs: Arc<str>,
    },
    /// Unary operator with no applicable implementation.
    UnaryOperandType { op: &'static str, type_name: Arc<str> },
    /// Ordering comparison with no applicable implementation.
    Unorderable {
        op: &'static str,
        lhs: Arc<str>,
        rhs: Arc<str>,
    },
    /// Call of a value whose type defines no `__call__`.
    NotCallable { type_name: Arc<str> },
    /// Attribute assignment or deletion on an immutable type.
    ImmutableType { type_name: Arc<str>, name: Arc<str> },
    /// Dispatch on a Rust type that was never registered while found classes are disabled.
    UnregisteredHostClass { class_name: Arc<str> },
    /// Exception raised by guest code or a built-in operation.
    Exc(Box<SimpleException>),
    /// An undefined slot was invoked.
    EmptySlot,
    /// Bug in the runtime, not in guest code.
    Internal(Cow<'static, str>),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchAttribute {
                type_name,
                name,
                on_type: true,
            } => write!(f, "type object '{type_name}' has no attribute '{name}'"),
            Self::NoSuchAttribute { type_name, name, .. } => {
                write!(f, "'{type_name}' object has no attribute '{name}'")
            }
            Self::ReadOnlyAttribute { type_name, name } => {
                write!(f, "attribute '{name}' of '{type_name}' objects is not writable")
            }
            Self::UndeletableAttribute { type_name, name } => {
                write!(f, "attribute '{name}' of '{type_name}' objects cannot be deleted")
            }
            Self::UnreadableAttribute { type_name, name } => {
                write!(f, "attribute '{name}' of '{type_name}' objects is not readable")
            }
            Self::WrongNameType { type_name } => {
                write!(f, "attribute name must be string, not '{type_name}'")
            }
            Self::OperandType { op, lhs, rhs } => {
                write!(f, "unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'")
            }
            Self::UnaryOperandType { op, type_name } => {
                if op.ends_with("()") {
                    write!(f, "bad operand type for {op}: '{type_name}'")
                } else {
                    write!(f, "bad operand type for unary {op}: '{type_name}'")
                }
            }
            Self::Unorderable { op, lhs, rhs } => {
                write!(f, "'{op}' not supported between instances of '{lhs}' and '{rhs}'")
            }
            Self::NotCallable { type_name } => write!(f, "'{type_name}' object is not callable"),
            Self::ImmutableType { type_name, name } => {
                write!(f, "cannot set '{name}' attribute of immutable type '{type_name}'")
            }
            Self::UnregisteredHostClass { class_name } => {
                write!(f, "no Python type is registered for Rust type '{class_name}'")
            }
            Self::Exc(exc) => match exc.arg() {
                Some(arg) => f.write_str(arg),
                None => write!(f, "{}", exc.exc_type()),
            },
            Self::EmptySlot => f.write_str("empty slot invoked"),
            Self::Internal(msg) => write!(f, "Internal error in pyrep: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl RunError {
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the Python exception class this error surfaces as.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::NoSuchAttribute { .. }
            | Self::ReadOnlyAttribute { .. }
            | Self::UndeletableAttribute { .. }
            | Self::UnreadableAttribute { .. } => ExcType::AttributeError,
            Self::WrongNameType { .. }
            | Self::OperandType { .. }
            | Self::UnaryOperandType { .. }
            | Self::Unorderable { .. }
            | Self::NotCallable { .. }
            | Self::ImmutableType { .. }
            | Self::UnregisteredHostClass { .. }
            | Self::EmptySlot => ExcType::TypeError,
            Self::Exc(exc) => exc.exc_type(),
            Self::Internal(_) => ExcType::RuntimeError,
        }
    }

    /// Returns true if this error means "the attribute is not there".
    ///
    /// These are the errors that let the secondary `__getattr__` hook run.
    #[must_use]
    pub fn is_attribute_missing(&self) -> bool {
        match self {
            Self::NoSuchAttribute { .. } => true,
            Self::Exc(exc) => exc.exc_type() == ExcType::AttributeError,
            _ => false,
        }
    }
}
