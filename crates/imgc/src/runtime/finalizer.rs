//! Finalizer - objects that want to hear about their death
//!
//! Types registered with a finalizer are allocated directly in the old
//! generation and remembered here. When marking finishes, every registered
//! object the marker did not reach moves to the run queue and is marked,
//! together with everything it references, so it survives the sweep. The
//! embedder pops it with [`Collector::next_dead_finalizable`] and runs its
//! finalizer; after that the object is ordinary garbage once unreachable.
//!
//! Objects on the run queue are roots until popped. No ordering between
//! finalizable objects is promised.

use crate::gc::Collector;
use crate::logging::GcEvent;
use crate::object::header::{header, GCFLAG_VISITED};
use crate::object::layout::TypeLayoutProvider;
use std::collections::VecDeque;

/// Registered and pending finalizable objects
#[derive(Debug, Default)]
pub struct FinalizerQueue {
    registered: Vec<usize>,
    run_finalizers: VecDeque<usize>,
}

impl FinalizerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a freshly allocated finalizable object
    pub fn register(&mut self, obj: usize) {
        self.registered.push(obj);
    }

    /// Objects waiting for their finalizer to run
    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.run_finalizers.iter().copied()
    }

    /// Number of objects waiting for their finalizer
    pub fn pending_len(&self) -> usize {
        self.run_finalizers.len()
    }

    /// Number of registered objects not yet found dead
    pub fn registered_len(&self) -> usize {
        self.registered.len()
    }

    fn pop_pending(&mut self) -> Option<usize> {
        self.run_finalizers.pop_front()
    }
}

impl Collector {
    /// Pop the next object whose finalizer should run
    ///
    /// The object stays valid until the next collection step; keep it in a
    /// root to use it longer.
    pub fn next_dead_finalizable(&mut self) -> Option<usize> {
        self.finalizers.pop_pending()
    }

    /// Number of dead objects waiting for their finalizer
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.pending_len()
    }

    /// Queue unreached finalizable objects and keep them alive
    ///
    /// Called once marking is otherwise complete.
    pub(crate) fn deal_with_objects_with_finalizers(&mut self, types: &dyn TypeLayoutProvider) {
        let registered = std::mem::take(&mut self.finalizers.registered);
        let mut survivors = Vec::with_capacity(registered.len());
        let mut queued = 0;

        for obj in registered {
            // SAFETY: registered objects are old and live until swept
            if unsafe { header(obj).has(GCFLAG_VISITED) } {
                survivors.push(obj);
            } else {
                self.finalizers.run_finalizers.push_back(obj);
                self.marker.push(obj);
                queued += 1;
            }
        }
        self.finalizers.registered = survivors;

        if queued > 0 {
            let visited = self.visit_all_objects(types);
            log::debug!("{} objects queued for finalization, {} objects resurrected", queued, visited);
            self.logger.record(GcEvent::Finalizers { queued });
        }
    }
}
