//! Runtime Module - services the collector offers back to the embedder
//!
//! Currently the finalizer queue: the collector decides *when* an object is
//! dead, the embedder decides what running its finalizer means.

pub mod finalizer;

pub use finalizer::FinalizerQueue;
