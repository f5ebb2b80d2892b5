use strum::{Display, EnumIter, IntoStaticStr};

use crate::slot::Slot;

/// Rich comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum Comparison {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

impl Comparison {
    #[must_use]
    pub fn slot(self) -> Slot {
        match self {
            Self::Lt => Slot::Lt,
            Self::Le => Slot::Le,
            Self::Eq => Slot::Eq,
            Self::Ne => Slot::Ne,
            Self::Gt => Slot::Gt,
            Self::Ge => Slot::Ge,
        }
    }

    /// The operator that answers the same question with the operands swapped.
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    /// Applies the operator to an `Ordering`.
    #[must_use]
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Lt => ordering == Less,
            Self::Le => ordering != Greater,
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Gt => ordering == Greater,
            Self::Ge => ordering != Less,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn swapping_twice_is_identity() {
        for op in Comparison::iter() {
            assert_eq!(op.swapped().swapped(), op);
        }
        assert_eq!(Comparison::Le.swapped(), Comparison::Ge);
        assert_eq!(Comparison::Ge.symbol(), ">=");
    }
}
