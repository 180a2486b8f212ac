//! Configuration Module - GC Tuning Parameters
//!
//! Every value here is read once, when the collector is created. Changing a
//! `GcConfig` afterwards has no effect on a running collector.

use crate::util::constants::{GB, KB, MB};
use crate::util::{Alignment, WORD};

/// Main configuration for the collector
///
/// Most parameters have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use imgc::GcConfig;
///
/// // Use default configuration
/// let config = GcConfig::default();
/// assert!(config.validate().is_ok());
///
/// // Small nursery, card marking disabled
/// let config = GcConfig {
///     nursery_size: 256 * 1024,
///     large_object_threshold: 16 * 1024,
///     card_page_indices: 0,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Size of the nursery in bytes
    ///
    /// Every new object that is not large is bump-allocated here. A full
    /// nursery triggers a minor collection.
    /// Default: 4MB
    pub nursery_size: usize,

    /// Size of the nursery sub-block handed to one execution context
    ///
    /// `None` gives the whole nursery to whichever context allocates first,
    /// which is the right choice for a single execution context.
    /// Default: None
    pub nursery_block_size: Option<usize>,

    /// Size of one arena in bytes
    ///
    /// Arenas are mapped from the OS on demand and unmapped once every page
    /// in them is empty after a sweep. Must be a multiple of `page_size` and
    /// of the OS page size.
    /// Default: 512KB
    pub arena_size: usize,

    /// Size of one arena page in bytes
    ///
    /// A page holds blocks of a single size class.
    /// Default: 8KB
    pub page_size: usize,

    /// Largest object (header included) served from arena pages
    ///
    /// Old objects above this size are raw-allocated.
    /// Default: 35 words
    pub small_request_threshold: usize,

    /// Allocations above this size (header included) bypass the nursery
    ///
    /// They are raw-allocated and tenured immediately.
    /// Default: 64KB
    pub large_object_threshold: usize,

    /// Number of array items covered by one card
    ///
    /// 0 disables card marking: writes into arrays then remember the whole
    /// array. Must be a power of two.
    /// Default: 128
    pub card_page_indices: usize,

    /// Growth factor for the next major collection threshold
    ///
    /// After a major cycle, the next one starts when the old generation has
    /// grown to `live_bytes * major_collection_threshold`.
    /// Default: 1.82
    pub major_collection_threshold: f64,

    /// Lower bound of the major collection threshold in bytes
    ///
    /// Default: 8 x nursery_size
    pub min_heap_size: usize,

    /// Hard limit on live bytes after a major cycle (0 = unlimited)
    ///
    /// Default: 0
    pub max_heap_size: usize,

    /// Objects visited per MARKING step
    ///
    /// Default: 10_000
    pub mark_step_budget: usize,

    /// Pages (or large objects) swept per SWEEPING step
    ///
    /// Default: 64
    pub sweep_step_pages: usize,

    /// Run the heap verifier after every collection
    ///
    /// Only has an effect in builds with debug assertions.
    /// Default: false
    pub verify_heap: bool,

    /// Record collection events in the in-memory event log
    ///
    /// Default: false
    pub record_events: bool,

    /// Emit a human-readable `info!` line for each collection
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        let nursery_size = 4 * MB;
        Self {
            nursery_size,
            nursery_block_size: None,
            arena_size: 512 * KB,
            page_size: 8 * KB,
            small_request_threshold: 35 * WORD,
            large_object_threshold: 64 * KB,
            card_page_indices: 128,
            major_collection_threshold: 1.82,
            min_heap_size: 8 * nursery_size,
            max_heap_size: 0,
            mark_step_budget: 10_000,
            sweep_step_pages: 64,
            verify_heap: false,
            record_events: false,
            verbose: false,
        }
    }
}

impl GcConfig {
    /// Effective size of one nursery sub-block
    pub fn block_size(&self) -> usize {
        self.nursery_block_size.unwrap_or(self.nursery_size)
    }

    /// Log2 of `card_page_indices` (0 when cards are disabled)
    pub fn card_page_shift(&self) -> u32 {
        if self.card_page_indices == 0 {
            0
        } else {
            self.card_page_indices.trailing_zeros()
        }
    }

    /// Validate configuration
    ///
    /// Returns an error describing the first inconsistent parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Nursery
        if self.nursery_size < 16 * WORD || !Alignment::is_aligned(self.nursery_size, WORD) {
            return Err(ConfigError::InvalidNursery(format!(
                "nursery_size must be a word-aligned size of at least {} bytes",
                16 * WORD
            )));
        }

        let block = self.block_size();
        if block == 0 || block > self.nursery_size || !Alignment::is_aligned(block, WORD) {
            return Err(ConfigError::InvalidNursery(
                "nursery_block_size must be word-aligned and fit in the nursery".to_string(),
            ));
        }

        // Arenas and pages
        if self.page_size == 0 || !Alignment::is_aligned(self.page_size, WORD) {
            return Err(ConfigError::InvalidArena(
                "page_size must be a non-zero multiple of the word size".to_string(),
            ));
        }

        if self.arena_size < self.page_size || self.arena_size % self.page_size != 0 {
            return Err(ConfigError::InvalidArena(
                "arena_size must be a multiple of page_size".to_string(),
            ));
        }

        let os_page = page_size::get();
        if self.arena_size % os_page != 0 {
            return Err(ConfigError::InvalidArena(format!(
                "arena_size must be a multiple of the OS page size ({} bytes)",
                os_page
            )));
        }

        // Thresholds
        if self.small_request_threshold < 2 * WORD
            || !Alignment::is_aligned(self.small_request_threshold, WORD)
            || self.small_request_threshold > self.page_size / 4
        {
            return Err(ConfigError::InvalidThreshold(
                "small_request_threshold must be word-aligned, >= 2 words and <= page_size / 4"
                    .to_string(),
            ));
        }

        if self.large_object_threshold < self.small_request_threshold {
            return Err(ConfigError::InvalidThreshold(
                "large_object_threshold must be >= small_request_threshold".to_string(),
            ));
        }

        if self.large_object_threshold > block {
            return Err(ConfigError::InvalidThreshold(
                "large_object_threshold must fit in one nursery block".to_string(),
            ));
        }

        // Cards
        if self.card_page_indices != 0 && !self.card_page_indices.is_power_of_two() {
            return Err(ConfigError::InvalidCards(
                "card_page_indices must be 0 or a power of two".to_string(),
            ));
        }

        // Major collection policy
        if !(self.major_collection_threshold > 1.0) {
            return Err(ConfigError::InvalidGrowth(
                "major_collection_threshold must be > 1.0".to_string(),
            ));
        }

        if self.max_heap_size != 0 && self.max_heap_size < self.min_heap_size {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size cannot be below min_heap_size".to_string(),
            ));
        }

        if self.mark_step_budget == 0 || self.sweep_step_pages == 0 {
            return Err(ConfigError::InvalidStepBudget(
                "step budgets must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - IMGC_NURSERY
    /// - IMGC_ARENA_SIZE
    /// - IMGC_PAGE_SIZE
    /// - IMGC_CARD_PAGE_INDICES
    /// - IMGC_MAJOR_COLLECT
    /// - IMGC_MIN
    /// - IMGC_MAX
    /// - IMGC_MARK_STEP
    /// - IMGC_VERBOSE
    ///
    /// Sizes accept a `KB`, `MB` or `GB` suffix.
    ///
    /// # Examples
    ///
    /// ```bash
    /// export IMGC_NURSERY=8MB
    /// export IMGC_MAJOR_COLLECT=2.5
    /// export IMGC_VERBOSE=1
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_size("IMGC_NURSERY") {
            config.nursery_size = size;
            config.min_heap_size = config.min_heap_size.max(8 * size);
        }

        if let Some(size) = env_size("IMGC_ARENA_SIZE") {
            config.arena_size = size;
        }

        if let Some(size) = env_size("IMGC_PAGE_SIZE") {
            config.page_size = size;
        }

        if let Some(count) = env_size("IMGC_CARD_PAGE_INDICES") {
            config.card_page_indices = count;
        }

        if let Ok(val) = std::env::var("IMGC_MAJOR_COLLECT") {
            match val.trim().parse::<f64>() {
                Ok(factor) => config.major_collection_threshold = factor,
                Err(_) => log::warn!("ignoring IMGC_MAJOR_COLLECT={:?}: not a number", val),
            }
        }

        if let Some(size) = env_size("IMGC_MIN") {
            config.min_heap_size = size;
        }

        if let Some(size) = env_size("IMGC_MAX") {
            config.max_heap_size = size;
        }

        if let Some(count) = env_size("IMGC_MARK_STEP") {
            config.mark_step_budget = count;
        }

        if let Ok(val) = std::env::var("IMGC_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid nursery: {0}")]
    InvalidNursery(String),

    #[error("Invalid arena geometry: {0}")]
    InvalidArena(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid card marking: {0}")]
    InvalidCards(String),

    #[error("Invalid growth factor: {0}")]
    InvalidGrowth(String),

    #[error("Invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("Invalid step budget: {0}")]
    InvalidStepBudget(String),
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse a size such as `4096`, `64KB`, `8MB` or `1GB`
pub fn parse_size(text: &str) -> Option<usize> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();

    let (digits, unit) = if let Some(rest) = upper.strip_suffix("GB") {
        (rest, GB)
    } else if let Some(rest) = upper.strip_suffix("MB") {
        (rest, MB)
    } else if let Some(rest) = upper.strip_suffix("KB") {
        (rest, KB)
    } else {
        (upper.as_str(), 1)
    };

    digits.trim().parse::<usize>().ok()?.checked_mul(unit)
}

fn env_size(name: &str) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let parsed = parse_size(&val);
    if parsed.is_none() {
        log::warn!("ignoring {}={:?}: not a size", name, val);
    }
    parsed
}
