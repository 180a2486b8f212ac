//! Object Module - GC-managed object model
//!
//! This module defines what the collector knows about an object: the header
//! word in front of it, the layout description it gets from the type-layout
//! provider, and how weak references inside objects are maintained.

pub mod header;
pub mod layout;
pub mod weak;

pub use header::{ObjectHeader, TypeId, HEADER_SIZE, MIN_OBJECT_SIZE};
pub use layout::{Layout, TypeInfo, TypeLayoutProvider, TypeTable};
