use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Latest ordered view of a synchronizer, tagged by subscription generation.
///
/// Resetting bumps the generation under the watch lock, so a task still
/// holding an older generation can never publish after the reset.
pub(crate) struct SnapshotCell<T> {
    tx: watch::Sender<Arc<Vec<T>>>,
    generation: AtomicU64,
}

impl<T> SnapshotCell<T> {
    pub(crate) fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Arc::new(Self {
            tx,
            generation: AtomicU64::new(0),
        })
    }

    /// Clear the view and return the generation new publishers must use.
    pub(crate) fn reset(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = Arc::new(Vec::new());
        });
        generation
    }

    /// Publish `view` unless `generation` has been superseded.
    pub(crate) fn publish(&self, generation: u64, view: Arc<Vec<T>>) -> bool {
        let mut published = false;
        self.tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = view;
            published = true;
            true
        });
        published
    }

    pub(crate) fn current(&self) -> Arc<Vec<T>> {
        self.tx.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_generation_cannot_publish() {
        let cell = SnapshotCell::<u32>::new();
        let first = cell.reset();
        assert!(cell.publish(first, Arc::new(vec![1])));
        assert_eq!(*cell.current(), vec![1]);

        let second = cell.reset();
        assert!(cell.current().is_empty());
        assert!(!cell.publish(first, Arc::new(vec![9])));
        assert!(cell.current().is_empty());
        assert!(cell.publish(second, Arc::new(vec![2])));
        assert_eq!(*cell.current(), vec![2]);
    }
}
