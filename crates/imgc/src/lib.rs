//! # imgc - Incremental Generational Moving Garbage Collector
//!
//! imgc is a garbage collector for language runtimes. Young objects are
//! bump-allocated in a nursery and copied out by frequent minor
//! collections; old objects are reclaimed by an incremental mark-and-sweep
//! cycle that advances in small bounded steps, one after each minor
//! collection, so no single pause grows with the heap.
//!
//! ## Overview
//!
//! - **Nursery**: bump allocation in per-context sub-blocks, emptied by
//!   copying survivors into the old generation
//! - **Old generation**: size-classed arenas for small objects, raw
//!   allocations for large ones; objects there never move
//! - **Write barrier**: one header-flag test per store, recording old
//!   objects that may point to young ones, with card marking for large
//!   arrays
//! - **Incremental major cycle**: SCANNING, MARKING, SWEEPING, FINALIZING,
//!   with the same barrier keeping marking correct between steps
//! - **Identity**: stable `id`/`identityhash` for objects that move once
//! - **Weakrefs and finalizers**, **hooks**, **statistics**, and an optional
//!   heap verifier
//!
//! The collector knows nothing about the language on top: object layouts
//! come from a [`TypeLayoutProvider`], roots from a [`RootWalker`].
//!
//! ## Quick Start
//!
//! ```rust
//! use imgc::{mutator, Collector, GcConfig, ShadowStack, TypeInfo, TypeTable};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), imgc::GcError> {
//!     let mut types = TypeTable::new();
//!     // a cell with two reference fields
//!     let cell = types.register(TypeInfo::struct_type("Cell", 16, vec![0, 8]));
//!
//!     let mut gc = Collector::new(GcConfig::default(), Arc::new(types))?;
//!     let roots = ShadowStack::new();
//!     gc.set_root_walker(Box::new(roots.clone()));
//!
//!     let head = gc.allocate(cell, 16);
//!     let slot = roots.push(head);
//!     let tail = gc.allocate(cell, 16);
//!
//!     // any allocation may move young objects: reload from the roots
//!     let head = roots.get(slot);
//!     unsafe { mutator::store_ref(&mut gc, head, 0, tail) };
//!
//!     gc.collect(1);
//!
//!     let head = roots.get(slot);
//!     assert!(!gc.is_young(head));
//!     let tail = unsafe { mutator::load_ref(head, 0) };
//!     assert!(!gc.is_young(tail));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Mutator Threads                      │
//! │   context 0        context 1        context 2           │
//! │  (free, top)      (free, top)      (free, top)          │
//! │       │                │                │               │
//! │       └────── allocate / write barrier ─┘               │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ nursery full
//! ┌───────────────────────────▼─────────────────────────────┐
//! │  Minor collection: cards, roots, remembered set         │
//! │  copy survivors -> arenas / raw allocations             │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ threshold reached or cycle running
//! ┌───────────────────────────▼─────────────────────────────┐
//! │  Major step: SCANNING -> MARKING -> SWEEPING ->         │
//! │              FINALIZING -> SCANNING                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Safety
//!
//! Objects are raw addresses. Users must follow these rules:
//!
//! 1. **Report every reference through the root walker**: unreported young
//!    objects are lost at the next minor collection
//! 2. **Never store a reference without the barrier**: use [`mutator`] or
//!    call the barriers yourself
//! 3. **Reload addresses after anything that may collect**: young objects
//!    move on allocation
//!
//! ### Thread Safety
//!
//! - [`Collector`] is `Send`; every operation takes `&mut self`
//! - Several threads share one through [`mutator::SharedCollector`], each
//!   switching to its own execution context
//!
//! ## Modules
//!
//! - [`allocator`]: nursery, arenas and raw allocations
//! - [`barrier`]: write barriers and card marking
//! - [`config`]: configuration parameters and validation
//! - [`error`]: error types and the fatal path
//! - [`gc`]: the collector and its major-cycle state machine
//! - [`hooks`]: event callbacks
//! - [`logging`]: per-collector event log
//! - [`marker`]: incremental marking and root walking
//! - [`mutator`]: barriered field access
//! - [`object`]: headers, layouts and weakrefs
//! - [`relocate`]: minor collection
//! - [`runtime`]: finalization
//! - [`stats`]: statistics
//! - [`util`]: word access, alignment and the heap verifier

// Core GC modules
pub mod config;
pub mod error;
pub mod gc;

// Memory management subsystems
pub mod allocator;
pub mod object;

// GC algorithm components
pub mod barrier;
pub mod marker;
pub mod relocate;

// Embedder interface and monitoring
pub mod hooks;
pub mod logging;
pub mod mutator;
pub mod runtime;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use allocator::{ContextId, MAIN_CONTEXT};
pub use config::{ConfigError, GcConfig};
pub use error::{GcError, Result};
pub use gc::{Collector, GcState};
pub use hooks::{CallbackHooks, GcHooks};
pub use marker::{RootCallback, RootWalker, ShadowStack};
pub use object::{Layout, TypeId, TypeInfo, TypeLayoutProvider, TypeTable};
pub use stats::{GcStatistics, StatsKind};

/// imgc version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a collector with the configuration found in the environment
///
/// See [`GcConfig::from_env`] for the variables read.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// let gc = imgc::init(Arc::new(imgc::TypeTable::new()))?;
/// assert_eq!(gc.state(), imgc::GcState::Scanning);
/// # Ok::<(), imgc::GcError>(())
/// ```
pub fn init(types: std::sync::Arc<dyn TypeLayoutProvider>) -> Result<Collector> {
    Collector::new(GcConfig::from_env(), types)
}

/// Create a collector with an explicit configuration
pub fn init_with_config(
    config: GcConfig,
    types: std::sync::Arc<dyn TypeLayoutProvider>,
) -> Result<Collector> {
    Collector::new(config, types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_init_default() {
        let result = init_with_config(GcConfig::default(), Arc::new(TypeTable::new()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
