use indexmap::IndexSet;

use crate::catalog::RelationId;

/// Deduplicated set of relation ids that remembers discovery order.
///
/// Grows without bound; iteration order is insertion order, which makes the
/// order maintenance runs in deterministic for a given query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationSet {
    ids: IndexSet<RelationId>,
}

impl RelationSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: RelationId) -> bool {
        self.ids.insert(id)
    }

    /// Membership test.
    pub fn contains(&self, id: RelationId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when no id has been inserted.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.ids.iter().copied()
    }

    /// Insert every id of `other`, keeping this set's order for ids already present.
    pub fn extend_from(&mut self, other: &RelationSet) {
        self.ids.extend(other.iter());
    }
}

impl FromIterator<RelationId> for RelationSet {
    fn from_iter<I: IntoIterator<Item = RelationId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<RelationId> for RelationSet {
    fn extend<I: IntoIterator<Item = RelationId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl<'a> IntoIterator for &'a RelationSet {
    type Item = RelationId;
    type IntoIter = std::iter::Copied<indexmap::set::Iter<'a, RelationId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}
