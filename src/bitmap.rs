//! Presence bitmap for optional fields
//!
//! One bit per field index in the owning message's descriptor. Only Optional
//! fields consult it: Required fields are always present and Repeated fields
//! are present when non-empty.

use crate::error::{Error, Result};

const WORD_BITS: usize = 64;

/// Presence bitmap helper
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PresenceBitmap {
    words: Vec<u64>,
    len: usize,
}

impl PresenceBitmap {
    /// Create an empty bitmap able to track `len` fields
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of fields tracked
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Set a field as present
    #[inline]
    pub fn set(&mut self, field_idx: usize) -> Result<()> {
        if field_idx >= self.len {
            return Err(Error::Overflow);
        }
        self.words[field_idx / WORD_BITS] |= 1 << (field_idx % WORD_BITS);
        Ok(())
    }

    /// Clear a field (mark as absent)
    #[inline]
    pub fn clear(&mut self, field_idx: usize) -> Result<()> {
        if field_idx >= self.len {
            return Err(Error::Overflow);
        }
        self.words[field_idx / WORD_BITS] &= !(1 << (field_idx % WORD_BITS));
        Ok(())
    }

    /// Check if a field is present
    #[inline]
    pub fn is_set(&self, field_idx: usize) -> bool {
        if field_idx >= self.len {
            return false;
        }
        (self.words[field_idx / WORD_BITS] >> (field_idx % WORD_BITS)) & 1 != 0
    }

    /// Count number of set bits
    #[inline]
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Check if bitmap is empty (no fields set)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Mark every field absent
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Iterator over set field indices
    #[inline]
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.is_set(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_basic_operations() {
        let mut bitmap = PresenceBitmap::new(8);

        assert!(bitmap.is_empty());
        assert_eq!(bitmap.count_set(), 0);
        assert!(!bitmap.is_set(0));

        bitmap.set(0).unwrap();
        bitmap.set(3).unwrap();
        bitmap.set(7).unwrap();

        assert!(!bitmap.is_empty());
        assert_eq!(bitmap.count_set(), 3);
        assert!(bitmap.is_set(0));
        assert!(bitmap.is_set(3));
        assert!(bitmap.is_set(7));
        assert!(!bitmap.is_set(1));

        bitmap.clear(3).unwrap();
        assert!(!bitmap.is_set(3));
        assert_eq!(bitmap.count_set(), 2);

        bitmap.clear_all();
        assert!(bitmap.is_empty());
    }

    #[test]
    fn test_bitmap_bounds() {
        let mut bitmap = PresenceBitmap::new(5);
        assert!(bitmap.set(4).is_ok());
        assert_eq!(bitmap.set(5), Err(Error::Overflow));
        assert!(!bitmap.is_set(99));
    }

    #[test]
    fn test_bitmap_spans_words() {
        let mut bitmap = PresenceBitmap::new(130);
        bitmap.set(0).unwrap();
        bitmap.set(64).unwrap();
        bitmap.set(129).unwrap();

        let set_fields: Vec<usize> = bitmap.iter_set().collect();
        assert_eq!(set_fields, vec![0, 64, 129]);
        assert_eq!(bitmap.count_set(), 3);
    }
}
