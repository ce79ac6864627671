//! Ids of manual orders still in flight. While any is present the session
//! refuses new commands.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashSet;

#[derive(Default)]
pub struct WaitingList {
    ids: Mutex<AHashSet<String>>,
}

impl WaitingList {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, AHashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, order_id: &str) {
        self.ids().insert(order_id.to_string());
    }

    pub fn remove(&self, order_id: &str) -> bool {
        self.ids().remove(order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.ids().contains(order_id)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Keep only the ids for which `keep` holds. Returns how many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let mut ids = self.ids();
        let before = ids.len();
        ids.retain(|id| keep(id));
        before - ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_retain() {
        let list = WaitingList::new();
        list.add("a");
        list.add("b");
        list.add("a");
        assert_eq!(list.len(), 2);
        assert!(list.remove("a"));
        assert!(!list.remove("a"));
        assert_eq!(list.retain(|id| id != "b"), 1);
        assert!(list.is_empty());
    }
}
