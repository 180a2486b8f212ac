//! Alignment Utilities
//!
//! Word-granularity rounding used by every allocation path.

/// Size of a machine word in bytes
pub const WORD: usize = std::mem::size_of::<usize>();

/// Alignment - utility for alignment operations
pub struct Alignment;

impl Alignment {
    /// Align value up to boundary
    ///
    /// # Examples
    /// ```
    /// use imgc::util::Alignment;
    /// assert_eq!(Alignment::align_up(100, 8), 104);
    /// assert_eq!(Alignment::align_up(64, 8), 64);
    /// ```
    #[inline]
    pub fn align_up(value: usize, alignment: usize) -> usize {
        (value + alignment - 1) & !(alignment - 1)
    }

    /// Align value down to boundary
    #[inline]
    pub fn align_down(value: usize, alignment: usize) -> usize {
        value & !(alignment - 1)
    }

    /// Check if value is aligned
    #[inline]
    pub fn is_aligned(value: usize, alignment: usize) -> bool {
        value & (alignment - 1) == 0
    }

    /// Round a byte count up to whole words
    #[inline]
    pub fn word_align(value: usize) -> usize {
        Self::align_up(value, WORD)
    }
}
