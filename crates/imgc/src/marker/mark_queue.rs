//! Mark Queue - grey objects waiting to be visited
//!
//! Two stacks:
//!
//! - `objects_to_trace`: what the marker is currently draining
//! - `more_objects_to_trace`: objects greyed between marking steps by the
//!   minor collection (barrier hits, freshly promoted objects, roots)
//!
//! A marking step first moves the second stack onto the first, then visits
//! objects until its budget runs out. Duplicates are harmless: visiting an
//! object that is already marked is a no-op.

use crate::object::header::{header, GCFLAG_VISITED};

/// Worklists of the incremental marker
#[derive(Debug, Default)]
pub struct MarkQueue {
    objects_to_trace: Vec<usize>,
    more_objects_to_trace: Vec<usize>,
    pushed: usize,
}

impl MarkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an object for the marker
    #[inline]
    pub fn push(&mut self, obj: usize) {
        self.objects_to_trace.push(obj);
        self.pushed += 1;
    }

    /// Pop the next object to visit
    #[inline]
    pub fn pop(&mut self) -> Option<usize> {
        self.objects_to_trace.pop()
    }

    /// Grey an object from outside the marker
    ///
    /// Clears its mark so the marker traces it again.
    ///
    /// # Safety
    /// `obj` must be a live old object.
    #[inline]
    pub unsafe fn grey(&mut self, obj: usize) {
        header(obj).clear(GCFLAG_VISITED);
        self.more_objects_to_trace.push(obj);
        self.pushed += 1;
    }

    /// Queue an object found between steps without touching its header
    #[inline]
    pub fn push_more(&mut self, obj: usize) {
        self.more_objects_to_trace.push(obj);
        self.pushed += 1;
    }

    /// Move the between-steps stack onto the trace stack
    pub fn flush_more(&mut self) {
        let mut more = std::mem::take(&mut self.more_objects_to_trace);
        self.objects_to_trace.append(&mut more);
        // keep the allocation for the next cycle
        self.more_objects_to_trace = more;
    }

    /// Check if both stacks are empty
    pub fn is_empty(&self) -> bool {
        self.objects_to_trace.is_empty() && self.more_objects_to_trace.is_empty()
    }

    /// Objects waiting on both stacks
    pub fn len(&self) -> usize {
        self.objects_to_trace.len() + self.more_objects_to_trace.len()
    }

    /// Total pushes since the last [`MarkQueue::reset_counters`]
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    pub fn reset_counters(&mut self) {
        self.pushed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::header::{init_header, ObjectHeader};

    #[test]
    fn test_push_pop_lifo() {
        let mut queue = MarkQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_more_objects_wait_for_flush() {
        let mut queue = MarkQueue::new();
        queue.push_more(7);
        assert!(!queue.is_empty());
        assert_eq!(queue.pop(), None);

        queue.flush_more();
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pushed(), 1);
    }

    #[test]
    fn test_grey_clears_mark() {
        let mut storage = [0usize; 2];
        let obj = storage.as_mut_ptr() as usize;
        let mut queue = MarkQueue::new();
        unsafe {
            init_header(obj, ObjectHeader::with_flags(1, GCFLAG_VISITED));
            queue.grey(obj);
            assert!(!header(obj).has(GCFLAG_VISITED));
        }
        assert_eq!(queue.len(), 1);
    }
}
