//! Root Scanning - the embedder's view of the roots
//!
//! The collector does not know where the mutator keeps its references. The
//! embedder plugs in a [`RootWalker`] that reports the *address of every
//! slot* holding a reference, one callback per root category:
//!
//! 1. **Stack roots** - local variables of mutator frames
//! 2. **Static non-GC roots** - globals living outside the GC heap
//! 3. **Static GC roots** - reference fields of prebuilt objects
//!
//! Callbacks may rewrite the slot (a minor collection moves young objects),
//! so walkers must hand out slot addresses that stay valid for the walk.
//! Any category may be skipped by passing `None`.
//!
//! [`ShadowStack`] is a ready-made walker for embedders that keep their
//! roots in an explicit vector.

use crate::gc::Collector;
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback invoked with the address of one root slot
pub type RootCallback = fn(&mut Collector, usize);

/// Enumerates the mutator's roots
pub trait RootWalker: Send {
    /// Report root slots to the given callbacks
    ///
    /// `is_minor` tells the walker that only slots that may hold young
    /// references matter.
    fn walk_roots(
        &mut self,
        gc: &mut Collector,
        collect_stack_root: Option<RootCallback>,
        collect_static_nongc: Option<RootCallback>,
        collect_static_gc: Option<RootCallback>,
        is_minor: bool,
    );
}

impl Collector {
    /// Run the installed walker with the given callbacks
    pub(crate) fn walk_roots(
        &mut self,
        collect_stack_root: Option<RootCallback>,
        collect_static_nongc: Option<RootCallback>,
        collect_static_gc: Option<RootCallback>,
        is_minor: bool,
    ) {
        if let Some(mut walker) = self.root_walker.take() {
            walker.walk_roots(
                self,
                collect_stack_root,
                collect_static_nongc,
                collect_static_gc,
                is_minor,
            );
            self.root_walker = Some(walker);
        }
    }
}

#[derive(Debug, Default)]
struct ShadowStackInner {
    stack: Vec<usize>,
    globals: Vec<usize>,
    prebuilt_slots: Vec<usize>,
}

/// Root walker over explicitly maintained root vectors
///
/// Clones share the same roots, so the mutator keeps one handle while the
/// collector owns another.
///
/// ```rust
/// use imgc::marker::roots::ShadowStack;
///
/// let roots = ShadowStack::new();
/// let handle = roots.clone();
/// handle.push(0);
/// assert_eq!(roots.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShadowStack {
    inner: Arc<Mutex<ShadowStackInner>>,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a reference; returns its index
    pub fn push(&self, obj: usize) -> usize {
        let mut inner = self.inner.lock();
        inner.stack.push(obj);
        inner.stack.len() - 1
    }

    /// Pop the top reference
    pub fn pop(&self) -> Option<usize> {
        self.inner.lock().stack.pop()
    }

    /// Current value of stack root `index` (0 when out of range)
    pub fn get(&self, index: usize) -> usize {
        self.inner.lock().stack.get(index).copied().unwrap_or(0)
    }

    /// Overwrite stack root `index`
    pub fn set(&self, index: usize, obj: usize) {
        if let Some(slot) = self.inner.lock().stack.get_mut(index) {
            *slot = obj;
        }
    }

    /// Drop every stack root from `len` on
    pub fn truncate(&self, len: usize) {
        self.inner.lock().stack.truncate(len);
    }

    /// Drop every stack root
    pub fn clear(&self) {
        self.inner.lock().stack.clear();
    }

    /// Number of stack roots
    pub fn len(&self) -> usize {
        self.inner.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().stack.is_empty()
    }

    /// Add a global root; returns its index
    pub fn add_global(&self, obj: usize) -> usize {
        let mut inner = self.inner.lock();
        inner.globals.push(obj);
        inner.globals.len() - 1
    }

    /// Current value of global `index` (0 when out of range)
    pub fn global(&self, index: usize) -> usize {
        self.inner.lock().globals.get(index).copied().unwrap_or(0)
    }

    /// Overwrite global `index`
    pub fn set_global(&self, index: usize, obj: usize) {
        if let Some(slot) = self.inner.lock().globals.get_mut(index) {
            *slot = obj;
        }
    }

    /// Register the address of a reference field inside a prebuilt object
    pub fn add_prebuilt_slot(&self, slot: usize) {
        self.inner.lock().prebuilt_slots.push(slot);
    }
}

impl RootWalker for ShadowStack {
    fn walk_roots(
        &mut self,
        gc: &mut Collector,
        collect_stack_root: Option<RootCallback>,
        collect_static_nongc: Option<RootCallback>,
        collect_static_gc: Option<RootCallback>,
        _is_minor: bool,
    ) {
        let mut inner = self.inner.lock();
        if let Some(callback) = collect_stack_root {
            for slot in inner.stack.iter_mut() {
                callback(gc, slot as *mut usize as usize);
            }
        }
        if let Some(callback) = collect_static_nongc {
            for slot in inner.globals.iter_mut() {
                callback(gc, slot as *mut usize as usize);
            }
        }
        if let Some(callback) = collect_static_gc {
            for &slot in inner.prebuilt_slots.iter() {
                callback(gc, slot);
            }
        }
    }
}
