//! Set of identities already persisted.

use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    ids: HashSet<u64>,
}

impl IdentitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Returns `true` if the identity was not already present.
    pub fn insert(&mut self, id: u64) -> bool {
        self.ids.insert(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

}

impl FromIterator<u64> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<u64> for IdentitySet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_and_insert() {
        let mut set: IdentitySet = [5, 100, 42].into_iter().collect();
        assert!(set.contains(42));
        assert!(!set.contains(43));

        assert!(set.insert(101));
        assert!(!set.insert(101));
        assert_eq!(set.len(), 4);
        assert!(IdentitySet::new().is_empty());

        set.extend([7, 8]);
        assert!(set.contains(8));
    }
}
