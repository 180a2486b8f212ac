//! Hooks - callbacks fired at collection events
//!
//! Three event classes, each with an "is enabled" query so the collector
//! can skip building events nobody listens to:
//!
//! | event              | fired after                         |
//! |--------------------|-------------------------------------|
//! | `gc_minor`         | every minor collection              |
//! | `gc_collect_step`  | every major collection step         |
//! | `gc_collect`       | the end of every major cycle        |
//!
//! Implement [`GcHooks`] directly, or use [`CallbackHooks`] to register
//! closures per event class.

use crate::gc::GcState;
use serde::Serialize;
use std::time::Duration;

/// Payload of the `gc_minor` hook
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MinorCollectEvent {
    pub duration: Duration,
    /// Bytes used by the old generation after the collection
    pub total_memory_used: usize,
    /// Always 0: objects are never pinned in the nursery
    pub pinned_objects: usize,
}

/// Payload of the `gc_collect_step` hook
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CollectStepEvent {
    pub duration: Duration,
    pub old_state: GcState,
    pub new_state: GcState,
}

/// Payload of the `gc_collect` hook
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MajorCollectEvent {
    /// Major cycles completed, this one included
    pub count: usize,
    pub arenas_count_before: usize,
    pub arenas_count_after: usize,
    /// Bytes used in arena blocks after the sweep
    pub arenas_bytes: usize,
    pub rawmalloc_bytes_before: usize,
    pub rawmalloc_bytes_after: usize,
}

/// Receiver of collection events
///
/// Hooks run inside the collector: they must not allocate from or collect
/// with the collector that fires them.
pub trait GcHooks: Send {
    fn is_gc_minor_enabled(&self) -> bool {
        false
    }

    fn is_gc_collect_step_enabled(&self) -> bool {
        false
    }

    fn is_gc_collect_enabled(&self) -> bool {
        false
    }

    fn on_gc_minor(&mut self, _event: &MinorCollectEvent) {}

    fn on_gc_collect_step(&mut self, _event: &CollectStepEvent) {}

    fn on_gc_collect(&mut self, _event: &MajorCollectEvent) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl GcHooks for NoHooks {}

pub type Callback<E> = Box<dyn FnMut(&E) + Send>;

/// Closure-based hooks, one optional callback per event class
///
/// ```rust
/// use imgc::hooks::{CallbackHooks, GcHooks};
///
/// let mut hooks = CallbackHooks::new();
/// assert!(!hooks.is_gc_minor_enabled());
/// hooks.set_on_gc_minor(|event| println!("minor took {:?}", event.duration));
/// assert!(hooks.is_gc_minor_enabled());
/// ```
#[derive(Default)]
pub struct CallbackHooks {
    on_gc_minor: Option<Callback<MinorCollectEvent>>,
    on_gc_collect_step: Option<Callback<CollectStepEvent>>,
    on_gc_collect: Option<Callback<MajorCollectEvent>>,
}

impl CallbackHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the `gc_minor` callback, returning the previous one
    pub fn set_on_gc_minor(
        &mut self,
        callback: impl FnMut(&MinorCollectEvent) + Send + 'static,
    ) -> Option<Callback<MinorCollectEvent>> {
        self.on_gc_minor.replace(Box::new(callback))
    }

    /// Install the `gc_collect_step` callback, returning the previous one
    pub fn set_on_gc_collect_step(
        &mut self,
        callback: impl FnMut(&CollectStepEvent) + Send + 'static,
    ) -> Option<Callback<CollectStepEvent>> {
        self.on_gc_collect_step.replace(Box::new(callback))
    }

    /// Install the `gc_collect` callback, returning the previous one
    pub fn set_on_gc_collect(
        &mut self,
        callback: impl FnMut(&MajorCollectEvent) + Send + 'static,
    ) -> Option<Callback<MajorCollectEvent>> {
        self.on_gc_collect.replace(Box::new(callback))
    }

    /// The installed `gc_minor` callback, left in place
    pub fn get_on_gc_minor(&mut self) -> Option<&mut Callback<MinorCollectEvent>> {
        self.on_gc_minor.as_mut()
    }

    pub fn get_on_gc_collect_step(&mut self) -> Option<&mut Callback<CollectStepEvent>> {
        self.on_gc_collect_step.as_mut()
    }

    pub fn get_on_gc_collect(&mut self) -> Option<&mut Callback<MajorCollectEvent>> {
        self.on_gc_collect.as_mut()
    }

    /// Remove the `gc_minor` callback
    pub fn take_on_gc_minor(&mut self) -> Option<Callback<MinorCollectEvent>> {
        self.on_gc_minor.take()
    }

    /// Remove the `gc_collect_step` callback
    pub fn take_on_gc_collect_step(&mut self) -> Option<Callback<CollectStepEvent>> {
        self.on_gc_collect_step.take()
    }

    /// Remove the `gc_collect` callback
    pub fn take_on_gc_collect(&mut self) -> Option<Callback<MajorCollectEvent>> {
        self.on_gc_collect.take()
    }
}

impl GcHooks for CallbackHooks {
    fn is_gc_minor_enabled(&self) -> bool {
        self.on_gc_minor.is_some()
    }

    fn is_gc_collect_step_enabled(&self) -> bool {
        self.on_gc_collect_step.is_some()
    }

    fn is_gc_collect_enabled(&self) -> bool {
        self.on_gc_collect.is_some()
    }

    fn on_gc_minor(&mut self, event: &MinorCollectEvent) {
        if let Some(callback) = self.on_gc_minor.as_mut() {
            callback(event);
        }
    }

    fn on_gc_collect_step(&mut self, event: &CollectStepEvent) {
        if let Some(callback) = self.on_gc_collect_step.as_mut() {
            callback(event);
        }
    }

    fn on_gc_collect(&mut self, event: &MajorCollectEvent) {
        if let Some(callback) = self.on_gc_collect.as_mut() {
            callback(event);
        }
    }
}

impl std::fmt::Debug for CallbackHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHooks")
            .field("on_gc_minor", &self.on_gc_minor.is_some())
            .field("on_gc_collect_step", &self.on_gc_collect_step.is_some())
            .field("on_gc_collect", &self.on_gc_collect.is_some())
            .finish()
    }
}
