use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt;
use std::hash::{Hash, Hasher};

use aggpush_common::types::DataType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Column reference to expression mapping, in declaration order.
pub type ColumnRefMap = IndexMap<ColumnRef, Expr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A column produced somewhere in the plan. Identity is the id alone; name and
/// type are carried for display and for building typed NULL constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnRef {
    pub fn new(id: u32, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: ColumnId(id),
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ColumnRef {}

impl Hash for ColumnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ColumnRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.name)
    }
}

#[derive(Debug, Default)]
pub struct ColumnRefFactory {
    next_id: u32,
}

impl ColumnRefFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> ColumnRef {
        self.next_id += 1;
        ColumnRef {
            id: ColumnId(self.next_id),
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRefSet(BTreeSet<ColumnRef>);

impl ColumnRefSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, column: ColumnRef) -> bool {
        self.0.insert(column)
    }

    pub fn contains(&self, column: &ColumnRef) -> bool {
        self.0.contains(column)
    }

    pub fn contains_all(&self, other: &ColumnRefSet) -> bool {
        other.0.is_subset(&self.0)
    }

    pub fn intersects(&self, other: &ColumnRefSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn union_with(&mut self, other: &ColumnRefSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, ColumnRef> {
        self.0.iter()
    }
}

impl FromIterator<ColumnRef> for ColumnRefSet {
    fn from_iter<I: IntoIterator<Item = ColumnRef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ColumnRefSet {
    type Item = &'a ColumnRef;
    type IntoIter = btree_set::Iter<'a, ColumnRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for ColumnRefSet {
    type Item = ColumnRef;
    type IntoIter = btree_set::IntoIter<ColumnRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ColumnRefSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, column) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", column)?;
        }
        write!(f, "}}")
    }
}
