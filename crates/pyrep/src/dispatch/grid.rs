//! Dense binary-operation grids.
//!
//! A [`BinaryGrid`] answers a binary operation between two values of the same
//! immutable type straight from a (host class × host class) table, skipping the
//! forward/reflected protocol. Grids are statically complete: building one
//! fails if any declared slot misses a combination, so a lookup that reaches
//! the table always finds a function.

use std::sync::Arc;

use ahash::AHashMap;
use smallvec::SmallVec;
use strum::EnumCount;

use crate::{
    exception::{ExcType, RunResult},
    host::{HostClass, HostKey},
    operation_set::OperationSet,
    runtime::Runtime,
    slot::Slot,
    types::TypeObject,
    value::Value,
};

/// A grid entry. Plain function pointers: grids never capture state.
pub type BinaryFn = fn(&Runtime, &Value, &Value) -> RunResult<Value>;

/// Complete binary tables for one immutable type.
pub struct BinaryGrid {
    classes: SmallVec<[HostKey; 4]>,
    /// Operation set index of the owner -> row/column in the tables.
    rep_to_grid: SmallVec<[Option<usize>; 4]>,
    /// Indexed by `Slot::index`; `None` for slots the grid does not cover.
    tables: Box<[Option<Box<[BinaryFn]>>]>,
}

impl BinaryGrid {
    /// The function for `lhs op rhs`, if the grid covers the slot and both host classes.
    #[inline]
    #[must_use]
    pub fn lookup(&self, slot: Slot, lhs: &OperationSet, rhs: &OperationSet) -> Option<BinaryFn> {
        let table = self.tables.get(slot.index())?.as_ref()?;
        let row = (*self.rep_to_grid.get(lhs.index())?)?;
        let col = (*self.rep_to_grid.get(rhs.index())?)?;
        table.get(row * self.classes.len() + col).copied()
    }

    #[must_use]
    pub fn covers(&self, slot: Slot) -> bool {
        self.tables.get(slot.index()).is_some_and(Option::is_some)
    }

    /// Host classes covered, in grid order.
    #[must_use]
    pub fn classes(&self) -> &[HostKey] {
        &self.classes
    }
}

impl std::fmt::Debug for BinaryGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots: Vec<Slot> = crate::slot::Slot::all().filter(|s| self.covers(*s)).collect();
        f.debug_struct("BinaryGrid")
            .field("classes", &self.classes)
            .field("slots", &slots)
            .finish()
    }
}

/// Collects grid entries and validates completeness.
///
/// ```
/// use pyrep::{GridBuilder, Runtime, Slot, Value};
///
/// fn add(_rt: &Runtime, _v: &Value, _w: &Value) -> pyrep::RunResult<Value> {
///     Ok(Value::Int(0))
/// }
///
/// let rt = Runtime::default();
/// let int_host = rt.builtin_host(pyrep::BuiltinHost::Int);
/// let builder = GridBuilder::new(vec![int_host.clone()]).entry(Slot::Add, &int_host, &int_host, add);
/// assert!(builder.is_complete());
/// ```
pub struct GridBuilder {
    classes: Vec<HostClass>,
    entries: AHashMap<Slot, Vec<Option<BinaryFn>>>,
    errors: Vec<String>,
}

impl GridBuilder {
    #[must_use]
    pub fn new(classes: Vec<HostClass>) -> Self {
        Self {
            classes,
            entries: AHashMap::new(),
            errors: Vec::new(),
        }
    }

    fn position(&self, class: &HostClass) -> Option<usize> {
        self.classes.iter().position(|c| c.key() == class.key())
    }

    fn row_mut(&mut self, slot: Slot) -> &mut Vec<Option<BinaryFn>> {
        let n = self.classes.len();
        self.entries.entry(slot).or_insert_with(|| vec![None; n * n])
    }

    /// Sets the function for one (lhs, rhs) combination.
    #[must_use]
    pub fn entry(mut self, slot: Slot, lhs: &HostClass, rhs: &HostClass, f: BinaryFn) -> Self {
        if !slot.is_forward_binary() {
            self.errors.push(format!("{slot} is not a forward binary slot"));
            return self;
        }
        match (self.position(lhs), self.position(rhs)) {
            (Some(row), Some(col)) => {
                let n = self.classes.len();
                self.row_mut(slot)[row * n + col] = Some(f);
            }
            _ => self
                .errors
                .push(format!("{slot}: '{lhs}' x '{rhs}' is outside the grid's classes")),
        }
        self
    }

    /// Sets one function for every combination of a slot.
    #[must_use]
    pub fn fill(mut self, slot: Slot, f: BinaryFn) -> Self {
        if !slot.is_forward_binary() {
            self.errors.push(format!("{slot} is not a forward binary slot"));
            return self;
        }
        self.row_mut(slot).fill(Some(f));
        self
    }

    /// True when no errors were recorded and every declared slot is fully populated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.entries.values().all(|row| row.iter().all(Option::is_some))
    }

    /// Validates the grid against its owner and freezes it.
    pub(crate) fn build(self, owner: &TypeObject) -> RunResult<Arc<BinaryGrid>> {
        if let Some(err) = self.errors.first() {
            return Err(ExcType::type_error(format!("invalid binary grid for '{}': {err}", owner.name())));
        }
        for (slot, row) in &self.entries {
            if let Some(missing) = row.iter().position(Option::is_none) {
                let n = self.classes.len();
                return Err(ExcType::type_error(format!(
                    "incomplete binary grid for '{}': {slot} has no entry for '{}' x '{}'",
                    owner.name(),
                    self.classes[missing / n],
                    self.classes[missing % n]
                )));
            }
        }
        let mut rep_to_grid: SmallVec<[Option<usize>; 4]> = SmallVec::from_elem(None, owner.representations().len());
        for (grid_index, class) in self.classes.iter().enumerate() {
            let Some(rep) = owner
                .representations()
                .iter()
                .position(|ops| ops.host_class().key() == class.key())
            else {
                return Err(ExcType::type_error(format!(
                    "binary grid class '{class}' is not a representation of '{}'",
                    owner.name()
                )));
            };
            rep_to_grid[rep] = Some(grid_index);
        }
        let mut tables: Vec<Option<Box<[BinaryFn]>>> = vec![None; Slot::COUNT];
        for (slot, row) in self.entries {
            tables[slot.index()] = Some(row.into_iter().flatten().collect());
        }
        Ok(Arc::new(BinaryGrid {
            classes: self.classes.iter().map(HostClass::key).collect(),
            rep_to_grid,
            tables: tables.into_boxed_slice(),
        }))
    }
}
