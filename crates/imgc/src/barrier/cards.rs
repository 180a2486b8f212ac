//! Card table helpers
//!
//! A large array of references gets one bit per `card_page_indices` items.
//! The bits live in bytes stored right before the object header, byte `i`
//! at `obj - 1 - i`, so the card area grows away from the object.

use crate::util::{Alignment, WORD};

/// Number of card bytes used by an array of `length` items
#[inline]
pub fn card_bytes_for_length(length: usize, card_page_indices: usize) -> usize {
    if card_page_indices == 0 {
        return 0;
    }
    let cards = length.div_ceil(card_page_indices);
    cards.div_ceil(8)
}

/// Size of the word-aligned card area placed in front of the header
#[inline]
pub fn card_area_size(length: usize, card_page_indices: usize) -> usize {
    Alignment::align_up(card_bytes_for_length(length, card_page_indices), WORD)
}

/// Address of card byte `byte_index` of `obj`
#[inline]
pub fn card_byte_address(obj: usize, byte_index: usize) -> usize {
    obj - 1 - byte_index
}

/// Set the card covering item `index`
///
/// # Safety
/// `obj` must be an object with a card area covering `index`.
#[inline]
pub unsafe fn set_card(obj: usize, index: usize, card_page_shift: u32) {
    let card = index >> card_page_shift;
    let byte = card_byte_address(obj, card >> 3) as *mut u8;
    *byte |= 1 << (card & 7);
}

/// Check the card covering item `index`
///
/// # Safety
/// Same as [`set_card`].
#[inline]
pub unsafe fn is_card_set(obj: usize, index: usize, card_page_shift: u32) -> bool {
    let card = index >> card_page_shift;
    let byte = card_byte_address(obj, card >> 3) as *const u8;
    *byte & (1 << (card & 7)) != 0
}

/// Read card byte `byte_index`
///
/// # Safety
/// `obj` must have at least `byte_index + 1` card bytes.
#[inline]
pub unsafe fn read_card_byte(obj: usize, byte_index: usize) -> u8 {
    *(card_byte_address(obj, byte_index) as *const u8)
}

/// Overwrite card byte `byte_index`
///
/// # Safety
/// Same as [`read_card_byte`].
#[inline]
pub unsafe fn write_card_byte(obj: usize, byte_index: usize, value: u8) {
    *(card_byte_address(obj, byte_index) as *mut u8) = value;
}

/// Clear the first `nbytes` card bytes of `obj`
///
/// # Safety
/// Same as [`read_card_byte`] for every byte.
pub unsafe fn clear_cards(obj: usize, nbytes: usize) {
    for i in 0..nbytes {
        write_card_byte(obj, i, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_sizes() {
        assert_eq!(card_bytes_for_length(0, 128), 0);
        assert_eq!(card_bytes_for_length(1, 128), 1);
        assert_eq!(card_bytes_for_length(128 * 8, 128), 1);
        assert_eq!(card_bytes_for_length(128 * 8 + 1, 128), 2);
        assert_eq!(card_bytes_for_length(1000, 0), 0);
        assert_eq!(card_area_size(128 * 8 + 1, 128), WORD);
    }

    #[test]
    fn test_set_and_clear() {
        let mut storage = [0usize; 4];
        // object right after two words of card area
        let obj = storage.as_mut_ptr() as usize + 2 * WORD;
        let shift = 128usize.trailing_zeros();

        unsafe {
            set_card(obj, 0, shift);
            set_card(obj, 130, shift);
            set_card(obj, 128 * 9, shift);

            assert!(is_card_set(obj, 5, shift));
            assert!(is_card_set(obj, 200, shift));
            assert!(!is_card_set(obj, 300, shift));
            assert_eq!(read_card_byte(obj, 0), 0b11);
            assert_eq!(read_card_byte(obj, 1), 0b10);

            clear_cards(obj, 2);
            assert_eq!(read_card_byte(obj, 0), 0);
            assert_eq!(read_card_byte(obj, 1), 0);
        }
        assert_eq!(storage[2], 0);
    }
}
