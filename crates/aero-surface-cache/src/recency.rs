use hashbrown::HashMap;
use std::collections::VecDeque;
use std::hash::Hash;

/// Access-ordered key sequence; the front is the least recently used key.
///
/// Every touch removes the key's existing occurrence and appends it at the back, so a key is
/// present at most once.
#[derive(Debug, Clone)]
pub(crate) struct RecencyList<K> {
    order: VecDeque<K>,
    index: HashMap<K, usize>,
}

impl<K> RecencyList<K>
where
    K: Copy + Eq + Hash,
{
    pub(crate) fn new() -> Self {
        Self {
            order: VecDeque::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn touch(&mut self, key: K) {
        if let Some(&pos) = self.index.get(&key) {
            self.order.remove(pos);
            self.rebuild_index();
        }
        self.index.insert(key, self.order.len());
        self.order.push_back(key);
    }

    pub(crate) fn front(&self) -> Option<K> {
        self.order.front().copied()
    }

    pub(crate) fn pop_front(&mut self) -> Option<K> {
        let key = self.order.pop_front()?;
        self.rebuild_index();
        Some(key)
    }

    pub(crate) fn remove(&mut self, key: &K) -> bool {
        let Some(&pos) = self.index.get(key) else {
            return false;
        };
        self.order.remove(pos);
        self.rebuild_index();
        true
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.order.iter().copied()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, k) in self.order.iter().enumerate() {
            self.index.insert(*k, i);
        }
    }
}

impl<K> Default for RecencyList<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::RecencyList;

    #[test]
    fn touch_moves_key_to_back() {
        let mut order = RecencyList::new();
        order.touch(1);
        order.touch(2);
        order.touch(3);
        order.touch(2);

        assert_eq!(order.len(), 3);
        assert_eq!(order.pop_front(), Some(1));
        assert_eq!(order.pop_front(), Some(3));
        assert_eq!(order.pop_front(), Some(2));
        assert_eq!(order.pop_front(), None);
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut order = RecencyList::new();
        for key in [10u32, 20, 30] {
            order.touch(key);
        }
        assert!(order.remove(&20));
        assert!(!order.remove(&20));
        order.touch(10);
        assert_eq!(order.iter().collect::<Vec<_>>(), vec![30, 10]);
    }
}
