//! Error Module - imgc Error Types
//!
//! Defines all error types used by the collector.
//!
//! # Error Categories
//!
//! ## Memory Errors
//! - `OutOfMemory` - The OS refused to hand out more memory
//! - `MapFailed` - Mapping the nursery or an arena failed
//! - `HeapLimitExceeded` - Live data outgrew `max_heap_size`
//!
//! ## Contract Errors
//! - `Configuration` - Invalid configuration at start-up
//! - `UnknownType` - A type id the layout provider does not know
//! - `UnknownContext` - An execution context that was never registered
//! - `InvariantViolation` - A collaborator broke a heap invariant
//!
//! Only start-up and context management hand these values back to the caller.
//! Inside allocation and collection there is nothing the mutator could do
//! with an error, so those paths go through [`fatal`] instead.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for all imgc operations
///
/// # Examples
///
/// ```rust
/// use imgc::error::GcError;
///
/// fn describe(err: &GcError) -> &'static str {
///     match err {
///         GcError::Configuration(_) => "fix the configuration",
///         GcError::OutOfMemory { .. } => "the machine is out of memory",
///         _ => "collector bug or misuse",
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcError {
    /// Out of memory
    ///
    /// **When returned:** an arena, the nursery or a large object could not
    /// be obtained from the operating system.
    ///
    /// **Recovery strategy:** none; mutator-facing paths abort.
    #[error("Out of memory: requested {requested} bytes for {what}")]
    OutOfMemory { requested: usize, what: &'static str },

    /// Memory mapping failed
    ///
    /// **When returned:** `mmap` (or the platform equivalent) reported an
    /// error while creating the nursery or an arena.
    #[error("Memory mapping of {size} bytes failed: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// Live data exceeds the configured heap limit
    ///
    /// **When returned:** a major cycle finished and the surviving bytes are
    /// still above `GcConfig::max_heap_size`.
    #[error("Heap limit exceeded: {live} live bytes, limit {limit} bytes")]
    HeapLimitExceeded { live: usize, limit: usize },

    /// Configuration error
    ///
    /// **When returned:** `Collector::new` got a configuration that failed
    /// `GcConfig::validate`.
    ///
    /// **Recovery strategy:** fix the configuration or fall back to defaults.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Unknown type id
    ///
    /// **When returned:** the type-layout provider has no entry for a type id
    /// found in an object header or passed to an allocation entry point.
    #[error("Unknown type id {type_id}")]
    UnknownType { type_id: u32 },

    /// Unknown execution context
    ///
    /// **When returned:** removing a context that was never registered, or
    /// removing the active one.
    #[error("Unknown or active execution context {0}")]
    UnknownContext(u64),

    /// Invariant violation - indicates a bug in the collector or a collaborator
    ///
    /// **When returned:** the heap verifier found a broken invariant.
    ///
    /// **Action required:** report with the verifier output.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl GcError {
    /// Check if this error leaves the process unable to continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GcError::OutOfMemory { .. }
                | GcError::MapFailed { .. }
                | GcError::HeapLimitExceeded { .. }
                | GcError::InvariantViolation(_)
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            GcError::UnknownType { .. } | GcError::InvariantViolation(_)
        )
    }
}

/// Result type alias for imgc operations
pub type Result<T> = std::result::Result<T, GcError>;

/// Abort the process after logging `err`
///
/// A collector that cannot account for its memory cannot keep running the
/// mutator, so there is no unwinding here.
#[cold]
#[inline(never)]
pub fn fatal(err: GcError) -> ! {
    log::error!("fatal GC error: {}", err);
    eprintln!("imgc: fatal error: {}", err);
    std::process::abort()
}

/// Unwrap a collector-internal result or abort
#[macro_export]
macro_rules! or_fatal {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => $crate::error::fatal(err),
        }
    };
}
