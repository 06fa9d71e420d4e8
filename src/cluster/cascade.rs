//! Cascade accumulator: side effects of a delete that must propagate beyond
//! the directly erased row.

use crate::types::ObjKey;
use rustc_hash::FxHashSet;

/// Accumulates object keys that must also be removed because they were
/// reachable only through the deleted object's references, plus bookkeeping
/// to guarantee each object is cascaded at most once.
#[derive(Debug, Default)]
pub struct CascadeState {
    pending: Vec<ObjKey>,
    seen: FxHashSet<ObjKey>,
}

impl CascadeState {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` for deletion unless it was already queued or processed.
    /// Returns whether the key was actually enqueued.
    pub fn enqueue(&mut self, key: ObjKey) -> bool {
        if self.seen.insert(key) {
            self.pending.push(key);
            true
        } else {
            false
        }
    }

    /// Marks `key` as already handled so later discoveries never re-queue it.
    pub fn mark_processed(&mut self, key: ObjKey) {
        self.seen.insert(key);
        self.pending.retain(|k| *k != key);
    }

    /// Takes the next pending deletion, marking nothing; the caller erases
    /// the object, which marks it processed.
    pub fn pop_pending(&mut self) -> Option<ObjKey> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    /// Deletions discovered but not yet performed.
    pub fn pending(&self) -> &[ObjKey] {
        &self.pending
    }

    /// `true` once `key` has been queued or processed.
    pub fn contains(&self, key: ObjKey) -> bool {
        self.seen.contains(&key)
    }

    /// `true` when no deletions remain to drain.
    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_exactly_once() {
        let mut state = CascadeState::new();
        assert!(state.enqueue(ObjKey(1)));
        assert!(!state.enqueue(ObjKey(1)));
        assert_eq!(state.pending(), &[ObjKey(1)]);
        assert_eq!(state.pop_pending(), Some(ObjKey(1)));
        assert!(!state.enqueue(ObjKey(1)));
        assert!(state.is_done());
    }

    #[test]
    fn processed_keys_are_never_queued() {
        let mut state = CascadeState::new();
        state.mark_processed(ObjKey(5));
        assert!(!state.enqueue(ObjKey(5)));
        assert!(state.is_done());
        // Marking a pending key as processed drops it from the queue.
        state.enqueue(ObjKey(6));
        state.mark_processed(ObjKey(6));
        assert!(state.is_done());
    }
}
