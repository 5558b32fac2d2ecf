use std::collections::HashMap;
use std::hash::Hash;

/// Set with O(1) insert, remove and index access.
///
/// Removal swaps the last element into the vacated slot, so iteration order is
/// insertion order only until the first removal.
#[derive(Debug, Clone)]
pub struct IndexedSet<T: Eq + Hash + Copy> {
    items: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T: Eq + Hash + Copy> Default for IndexedSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Copy> IndexedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.positions.contains_key(&item) {
            return false;
        }
        self.positions.insert(item, self.items.len());
        self.items.push(item);
        true
    }

    /// Returns `false` if absent.
    pub fn remove(&mut self, item: &T) -> bool {
        let Some(index) = self.positions.remove(item) else {
            return false;
        };
        self.items.swap_remove(index);
        if let Some(moved) = self.items.get(index) {
            self.positions.insert(*moved, index);
        }
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_remove_keeps_positions() {
        let mut set = IndexedSet::new();
        for i in 0..5u64 {
            assert!(set.insert(i));
        }
        assert!(!set.insert(3));

        assert!(set.remove(&1));
        assert_eq!(set.as_slice(), &[0, 4, 2, 3]);
        assert!(set.remove(&4));
        assert!(set.remove(&3));
        assert_eq!(set.as_slice(), &[0, 2]);
        assert!(!set.remove(&4));

        for (index, item) in set.as_slice().iter().enumerate() {
            assert_eq!(set.positions[item], index);
        }
    }

    #[test]
    fn test_remove_last_and_only() {
        let mut set = IndexedSet::new();
        set.insert(9u64);
        assert!(set.remove(&9));
        assert!(set.is_empty());
        assert!(!set.contains(&9));
    }
}
