//! Lock-free work queue handing work items to fetch workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free queue over a borrowed slice of work items.
///
/// Workers call [`next()`](WorkQueue::next) to claim the next item together
/// with its submission index. Every item is handed out exactly once.
pub struct WorkQueue<'a, S> {
    items: &'a [S],
    cursor: AtomicUsize,
}

impl<'a, S> WorkQueue<'a, S> {
    pub fn new(items: &'a [S]) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free)
    pub fn next(&self) -> Option<(usize, &'a S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|item| (i, item))
    }

    /// Items not yet claimed
    pub fn remaining(&self) -> usize {
        self.items
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_in_order_with_index() {
        let items = ["a", "b", "a"];
        let q = WorkQueue::new(&items);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some((0, &"a")));
        assert_eq!(q.next(), Some((1, &"b")));
        assert_eq!(q.remaining(), 1);
        assert_eq!(q.next(), Some((2, &"a")));
        assert_eq!(q.next(), None);
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn empty_queue() {
        let items: [i32; 0] = [];
        let q = WorkQueue::new(&items);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        let items: Vec<usize> = (0..1000).collect();
        let q = WorkQueue::new(&items);
        let claimed = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some((i, _)) = q.next() {
                        claimed.lock().unwrap().push(i);
                    }
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort_unstable();
        assert_eq!(claimed, items);
    }
}
