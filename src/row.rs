//! Row buffer layout: NULL bitmap placement, per-column offsets, and the
//! fixed-size in-row cells used for NUMERIC and blob (TEXT/IMAGE/NTEXT)
//! columns.
//!
//! A decoded row is one contiguous buffer: a leading NULL bitmap sized
//! `ceil(num_cols / 8)` bytes, followed by each column's payload at a
//! precomputed offset. Numeric and blob columns store a small fixed header
//! in the row; blob payload bytes are owned separately and referenced from
//! the header, since their length isn't known until decode time.

use crate::prelude::*;
use crate::types::NUMERIC_BYTES_PER_PREC;

/// Row buffer alignment, matching the teacher's general struct alignment
/// conventions so per-column footprints never straddle a word boundary.
pub const ALIGN: usize = 8;

/// Round `size` up to the next multiple of [`ALIGN`].
#[must_use]
pub const fn align_up(size: usize) -> usize {
    (size + ALIGN - 1) / ALIGN * ALIGN
}

/// Number of bytes needed for a NULL bitmap covering `num_cols` columns.
#[must_use]
pub const fn bitmap_len(num_cols: usize) -> usize {
    num_cols.div_ceil(8)
}

/// An in-row NUMERIC/DECIMAL cell: precision, scale, sign, and magnitude
/// bytes. The meaningful magnitude length is
/// `NUMERIC_BYTES_PER_PREC[precision]`; the array is sized for the largest
/// precision this crate supports (38 digits).
#[derive(Debug, Clone, Copy)]
pub struct NumericCell {
    /// Declared precision (total digits), 1..=38.
    pub precision: u8,
    /// Declared scale (digits after the decimal point).
    pub scale: u8,
    /// `true` for negative, `false` for non-negative (the wire uses 1 = positive).
    pub negative: bool,
    /// Little-endian magnitude bytes; only the first
    /// `NUMERIC_BYTES_PER_PREC[precision]` bytes are meaningful.
    pub magnitude: [u8; 17],
}

impl NumericCell {
    /// Build a zeroed cell for the given precision/scale.
    #[must_use]
    pub const fn new(precision: u8, scale: u8) -> Self {
        Self {
            precision,
            scale,
            negative: false,
            magnitude: [0; 17],
        }
    }

    /// Number of magnitude bytes that are meaningful for this cell's
    /// precision.
    #[must_use]
    pub fn magnitude_len(&self) -> usize {
        NUMERIC_BYTES_PER_PREC[self.precision as usize] as usize
    }

    /// Fixed in-row footprint of a numeric cell, independent of precision
    /// (sized for the worst case so column offsets don't depend on the
    /// column's specific precision).
    #[must_use]
    pub const fn footprint() -> usize {
        align_up(core::mem::size_of::<Self>())
    }
}

/// An in-row blob cell for TEXT/IMAGE/NTEXT columns: a 16-byte text pointer,
/// an 8-byte update timestamp, and an owned payload whose length is decided
/// at decode time.
#[derive(Debug, Clone, Default)]
pub struct BlobCell {
    /// Server-assigned text pointer, used by `WRITETEXT`/`UPDATETEXT`.
    pub textptr: [u8; 16],
    /// Row-versioning timestamp accompanying the text pointer.
    pub timestamp: [u8; 8],
    /// Owned payload bytes; length equals the column's `cur_size`.
    pub data: Vec<u8>,
}

impl BlobCell {
    /// Fixed in-row footprint of a blob cell header (payload is heap-owned
    /// and not counted in row size).
    #[must_use]
    pub const fn footprint() -> usize {
        align_up(16 + 8 + core::mem::size_of::<Vec<u8>>())
    }
}

/// A decoded row: a NULL bitmap plus per-column storage, reused across rows
/// of the same descriptor by overwriting in place.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    /// `ceil(num_cols / 8)`-byte NULL bitmap; bit `i` set means column `i`
    /// is NULL.
    bitmap: Vec<u8>,
    /// Raw backing storage for fixed/variable scalar payloads, sized to
    /// `row_size`. Numeric and blob columns are stored out-of-line in
    /// `numerics`/`blobs` and only reserve their footprint here.
    scalars: Vec<u8>,
    numerics: Vec<NumericCell>,
    blobs: Vec<BlobCell>,
    /// Actual decoded length of each column's value, distinct from its
    /// declared `column_size` once a CHAR/BINARY value has been
    /// space/zero-padded to the full declared width.
    cur_sizes: Vec<usize>,
}

impl RowBuffer {
    /// Allocate a row buffer sized for `num_cols` columns and `row_size`
    /// bytes of scalar payload.
    #[must_use]
    pub fn alloc(num_cols: usize, row_size: usize, num_numeric: usize, num_blob: usize) -> Self {
        Self {
            bitmap: vec![0u8; bitmap_len(num_cols)],
            scalars: vec![0u8; row_size],
            numerics: (0..num_numeric).map(|_| NumericCell::new(0, 0)).collect(),
            blobs: (0..num_blob).map(|_| BlobCell::default()).collect(),
            cur_sizes: vec![0usize; num_cols],
        }
    }

    /// Mark column `idx` NULL or not-NULL.
    pub fn set_null(&mut self, idx: usize, is_null: bool) {
        let byte = idx / 8;
        let bit = 1u8 << (idx % 8);
        if is_null {
            self.bitmap[byte] |= bit;
        } else {
            self.bitmap[byte] &= !bit;
        }
    }

    /// Query whether column `idx` is NULL.
    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        (self.bitmap[idx / 8] & (1u8 << (idx % 8))) != 0
    }

    /// Mutable view of the scalar payload at `[offset, offset + len)`.
    pub fn scalar_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.scalars[offset..offset + len]
    }

    /// Immutable view of the scalar payload at `[offset, offset + len)`.
    #[must_use]
    pub fn scalar(&self, offset: usize, len: usize) -> &[u8] {
        &self.scalars[offset..offset + len]
    }

    /// Numeric cell at slot `idx` (as assigned by descriptor layout, not
    /// column index).
    pub fn numeric_mut(&mut self, idx: usize) -> &mut NumericCell {
        &mut self.numerics[idx]
    }

    /// Immutable numeric cell at slot `idx`.
    #[must_use]
    pub fn numeric(&self, idx: usize) -> &NumericCell {
        &self.numerics[idx]
    }

    /// Blob cell at slot `idx`.
    pub fn blob_mut(&mut self, idx: usize) -> &mut BlobCell {
        &mut self.blobs[idx]
    }

    /// Immutable blob cell at slot `idx`.
    #[must_use]
    pub fn blob(&self, idx: usize) -> &BlobCell {
        &self.blobs[idx]
    }

    /// Record the actual decoded length of column `idx`, set by the value
    /// decoder on every call (post-padding for CHAR/BINARY columns).
    pub fn set_cur_size(&mut self, idx: usize, size: usize) {
        self.cur_sizes[idx] = size;
    }

    /// The actual decoded length of column `idx`.
    #[must_use]
    pub fn cur_size(&self, idx: usize) -> usize {
        self.cur_sizes[idx]
    }

    /// Total row size in bytes: bitmap plus scalar payload.
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.bitmap.len() + self.scalars.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_len_rounds_up() {
        assert_eq!(bitmap_len(0), 0);
        assert_eq!(bitmap_len(1), 1);
        assert_eq!(bitmap_len(8), 1);
        assert_eq!(bitmap_len(9), 2);
        assert_eq!(bitmap_len(17), 3);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), ALIGN);
        assert_eq!(align_up(ALIGN), ALIGN);
        assert_eq!(align_up(ALIGN + 1), ALIGN * 2);
    }

    #[test]
    fn test_null_bitmap_roundtrip() {
        let mut row = RowBuffer::alloc(10, 32, 0, 0);
        row.set_null(0, true);
        row.set_null(3, true);
        row.set_null(9, true);
        assert!(row.is_null(0));
        assert!(!row.is_null(1));
        assert!(row.is_null(3));
        assert!(row.is_null(9));
        row.set_null(3, false);
        assert!(!row.is_null(3));
    }

    #[test]
    fn test_scalar_offset_roundtrip() {
        let mut row = RowBuffer::alloc(2, 16, 0, 0);
        row.scalar_mut(0, 4).copy_from_slice(&42i32.to_le_bytes());
        assert_eq!(row.scalar(0, 4), &42i32.to_le_bytes());
    }

    #[test]
    fn test_numeric_magnitude_len() {
        let cell = NumericCell::new(5, 2);
        assert_eq!(cell.magnitude_len(), 5);
        let cell = NumericCell::new(38, 0);
        assert_eq!(cell.magnitude_len(), 17);
    }
}
