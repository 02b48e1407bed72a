//! Round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selector.
/// Stores an internal counter to rotate through a fixed set of slots.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next slot index in `0..len`, or `None` when there are no slots.
    pub fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % len)
    }

    /// Next item of `items` in rotation.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.next_index(items.len()).map(|i| &items[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_all_slots() {
        let rr = RoundRobin::new();
        let slots = ["a", "b", "c"];
        let picked: Vec<_> = (0..7).filter_map(|_| rr.pick(&slots)).copied().collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn empty_set_yields_nothing() {
        let rr = RoundRobin::new();
        assert_eq!(rr.next_index(0), None);
    }
}
