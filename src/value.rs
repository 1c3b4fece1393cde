//! Per-column value decoding: NULL detection, the fixed/variable/numeric/
//! blob length conventions, and the endian-fixup step.

use crate::descriptor::{CellClass, ColumnInfo};
use crate::error::ProtocolError;
use crate::reader::{ByteSource, WireReader};
use crate::row::RowBuffer;
use crate::types::{ConversionType, TypeId};

/// Decode one column's value for the current row and place it into `row`
/// at `col_idx` (the column's position within its descriptor, used for
/// the NULL bitmap — distinct from `col.cell_slot`, which indexes the
/// numeric/blob side arrays).
pub fn decode_value<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    match col.varint_size {
        4 => decode_blob(reader, col, col_idx, row),
        2 => decode_len16(reader, col, col_idx, row),
        1 if col.column_type.is_numeric() => decode_numeric(reader, col, col_idx, row),
        1 => decode_len8(reader, col, col_idx, row),
        _ => decode_fixed(reader, col, col_idx, row),
    }
}

fn swap_scalar<R: ByteSource>(reader: &WireReader<R>, buf: &mut [u8], conv: ConversionType) {
    if !reader.swap_bytes {
        return;
    }
    match conv {
        ConversionType::Scalar2 | ConversionType::Scalar4 | ConversionType::Scalar8 => {
            buf.reverse();
        }
        ConversionType::PairedHalf => {
            let mid = buf.len() / 2;
            if reader.broken_money_endian {
                buf[..mid].reverse();
                buf[mid..].reverse();
            } else {
                buf.reverse();
            }
        }
        ConversionType::Unique => {
            // uniqueidentifier: Data1 (4), Data2 (2), Data3 (2) are each
            // byte-swapped independently; Data4 (8 bytes) is left alone.
            if buf.len() >= 8 {
                buf[0..4].reverse();
                buf[4..6].reverse();
                buf[6..8].reverse();
            }
        }
        ConversionType::Opaque | ConversionType::Numeric => {}
    }
}

fn decode_fixed<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    row.set_null(col_idx, false);
    let mut bytes = reader.get_bytes(col.column_size)?;
    swap_scalar(reader, &mut bytes, col.column_type.conversion_type());
    row.scalar_mut(col.offset, col.column_size)
        .copy_from_slice(&bytes);
    row.set_cur_size(col_idx, col.column_size);
    Ok(())
}

fn decode_len8<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    let len = reader.get_u8()? as usize;
    if len == 0 {
        row.set_null(col_idx, true);
        row.set_cur_size(col_idx, 0);
        return Ok(());
    }
    if len > col.column_size {
        return Err(ProtocolError::ColumnSizeOverflow {
            column_size: len,
            max: col.column_size,
            type_byte: col.column_type_save,
        });
    }
    row.set_null(col_idx, false);
    let mut bytes = reader.get_bytes(len)?;
    swap_scalar(reader, &mut bytes, col.column_type.conversion_type());
    row.scalar_mut(col.offset, col.column_size)[..len].copy_from_slice(&bytes);
    row.set_cur_size(col_idx, len);
    Ok(())
}

fn decode_len16<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    let len = reader.get_u16()? as usize;
    if len == 0xFFFF {
        row.set_null(col_idx, true);
        row.set_cur_size(col_idx, 0);
        return Ok(());
    }
    if len > col.column_size {
        return Err(ProtocolError::ColumnSizeOverflow {
            column_size: len,
            max: col.column_size,
            type_byte: col.column_type_save,
        });
    }
    row.set_null(col_idx, false);
    let mut bytes = reader.get_bytes(len)?;
    swap_scalar(reader, &mut bytes, col.column_type.conversion_type());
    let dest = row.scalar_mut(col.offset, col.column_size);
    dest[..len].copy_from_slice(&bytes);

    // Fixed-length CHAR/BINARY pad a short value up to the declared
    // column size: space for CHAR, zero for BINARY. Variable-length
    // (VARCHAR/VARBINARY and wide/XML/UDT) columns are left as decoded.
    let cur_size = match col.column_type {
        TypeId::Char | TypeId::BigChar => {
            dest[len..].fill(b' ');
            col.column_size
        }
        TypeId::Binary | TypeId::BigBinary => {
            dest[len..].fill(0);
            col.column_size
        }
        _ => len,
    };
    row.set_cur_size(col_idx, cur_size);
    Ok(())
}

fn decode_numeric<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    debug_assert_eq!(col.cell_class, CellClass::Numeric);
    let len = reader.get_u8()? as usize;
    if len == 0 {
        row.set_null(col_idx, true);
        row.set_cur_size(col_idx, 0);
        return Ok(());
    }
    row.set_null(col_idx, false);
    let sign = reader.get_u8()?;
    let magnitude_len = len - 1;
    let mut magnitude = reader.get_bytes(magnitude_len)?;
    if reader.swap_bytes {
        magnitude.reverse();
    }
    let cell = row.numeric_mut(col.cell_slot);
    cell.precision = col.column_prec;
    cell.scale = col.column_scale;
    cell.negative = sign == 0;
    cell.magnitude = [0; 17];
    let n = magnitude_len.min(cell.magnitude.len());
    cell.magnitude[..n].copy_from_slice(&magnitude[..n]);
    row.set_cur_size(col_idx, magnitude_len);
    Ok(())
}

fn decode_blob<R: ByteSource>(
    reader: &mut WireReader<R>,
    col: &ColumnInfo,
    col_idx: usize,
    row: &mut RowBuffer,
) -> Result<(), ProtocolError> {
    debug_assert_eq!(col.cell_class, CellClass::Blob);
    let textptr_len = reader.get_u8()?;
    if textptr_len != 16 {
        row.set_null(col_idx, true);
        row.set_cur_size(col_idx, 0);
        return Ok(());
    }
    row.set_null(col_idx, false);
    let textptr_bytes = reader.get_bytes(textptr_len as usize)?;
    let timestamp: [u8; 8] = reader.get_array()?;
    let size = reader.get_u32()? as usize;
    let data = reader.get_bytes(size)?;

    let cell = row.blob_mut(col.cell_slot);
    cell.textptr = [0; 16];
    let n = textptr_bytes.len().min(16);
    cell.textptr[..n].copy_from_slice(&textptr_bytes[..n]);
    cell.timestamp = timestamp;
    let data_len = data.len();
    cell.data = data;
    row.set_cur_size(col_idx, data_len);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::descriptor::{CellClass, Collation, ColumnDescFlags};
    use crate::types::TypeId;

    struct SliceSource<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> ByteSource for SliceSource<'a> {
        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
            if self.pos + buf.len() > self.data.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
            self.pos += buf.len();
            Ok(())
        }
    }

    fn reader(data: &[u8]) -> WireReader<SliceSource<'_>> {
        WireReader::new(SliceSource { data, pos: 0 })
    }

    fn int4_column() -> ColumnInfo {
        ColumnInfo {
            name: String::new(),
            column_type: TypeId::Int4,
            column_type_save: 0x38,
            varint_size: 0,
            column_size: 4,
            column_prec: 0,
            column_scale: 0,
            collation: Collation::default(),
            flags: ColumnDescFlags::default(),
            usertype: 0,
            operator: 0,
            operand: 0,
            offset: 0,
            cell_class: CellClass::Scalar,
            cell_slot: 0,
        }
    }

    #[test]
    fn test_decode_fixed_int4() {
        let mut r = reader(&42i32.to_le_bytes());
        let col = int4_column();
        let mut row = RowBuffer::alloc(1, 4, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
        assert_eq!(
            i32::from_le_bytes(row.scalar(0, 4).try_into().unwrap()),
            42
        );
    }

    #[test]
    fn test_decode_len8_null() {
        let mut r = reader(&[0]);
        let mut col = int4_column();
        col.varint_size = 1;
        col.column_type = TypeId::IntN;
        let mut row = RowBuffer::alloc(1, 4, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(row.is_null(0));
    }

    #[test]
    fn test_decode_len16_empty_not_null() {
        let data = 0u16.to_le_bytes();
        let mut r = reader(&data);
        let mut col = int4_column();
        col.varint_size = 2;
        col.column_type = TypeId::BigVarChar;
        col.column_size = 0;
        let mut row = RowBuffer::alloc(1, 0, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
    }

    #[test]
    fn test_decode_len16_null_sentinel() {
        let mut r = reader(&0xFFFFu16.to_le_bytes());
        let mut col = int4_column();
        col.varint_size = 2;
        col.column_type = TypeId::BigVarChar;
        let mut row = RowBuffer::alloc(1, col.column_size, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(row.is_null(0));
    }

    #[test]
    fn test_decode_numeric() {
        let mut data = vec![4u8, 1u8]; // len=4 (1 sign + 3 magnitude), sign=positive
        data.extend_from_slice(&[0x01, 0x00, 0x00]);
        let mut r = reader(&data);
        let mut col = int4_column();
        col.varint_size = 1;
        col.column_type = TypeId::Numeric;
        col.column_prec = 5;
        col.column_scale = 0;
        col.cell_class = CellClass::Numeric;
        let mut row = RowBuffer::alloc(1, 0, 1, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
        let cell = row.numeric(0);
        assert!(!cell.negative);
        assert_eq!(cell.magnitude[0], 0x01);
    }

    #[test]
    fn test_decode_blob_null() {
        let mut r = reader(&[0]);
        let mut col = int4_column();
        col.varint_size = 4;
        col.column_type = TypeId::Text;
        col.cell_class = CellClass::Blob;
        let mut row = RowBuffer::alloc(1, 0, 0, 1);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(row.is_null(0));
    }

    #[test]
    fn test_decode_blob_non_16_textptr_len_is_null() {
        // Any textptr length other than 16 must be treated as NULL, not
        // just 0.
        let mut r = reader(&[4]);
        let mut col = int4_column();
        col.varint_size = 4;
        col.column_type = TypeId::Text;
        col.cell_class = CellClass::Blob;
        let mut row = RowBuffer::alloc(1, 0, 0, 1);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(row.is_null(0));
        assert_eq!(row.cur_size(0), 0);
    }

    #[test]
    fn test_decode_len16_char_pads_with_space() {
        let mut data = 3u16.to_le_bytes().to_vec(); // value length 3
        data.extend_from_slice(b"abc");
        let mut r = reader(&data);
        let mut col = int4_column();
        col.varint_size = 2;
        col.column_type = TypeId::BigChar;
        col.column_size = 6;
        let mut row = RowBuffer::alloc(1, 6, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
        assert_eq!(row.scalar(0, 6), b"abc   ");
        assert_eq!(row.cur_size(0), 6);
    }

    #[test]
    fn test_decode_len16_binary_pads_with_zero() {
        let mut data = 2u16.to_le_bytes().to_vec(); // value length 2
        data.extend_from_slice(&[0xAA, 0xBB]);
        let mut r = reader(&data);
        let mut col = int4_column();
        col.varint_size = 2;
        col.column_type = TypeId::BigBinary;
        col.column_size = 4;
        let mut row = RowBuffer::alloc(1, 4, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
        assert_eq!(row.scalar(0, 4), &[0xAA, 0xBB, 0x00, 0x00]);
        assert_eq!(row.cur_size(0), 4);
    }

    #[test]
    fn test_decode_len16_varchar_not_padded() {
        let mut data = 2u16.to_le_bytes().to_vec(); // value length 2
        data.extend_from_slice(b"ab");
        let mut r = reader(&data);
        let mut col = int4_column();
        col.varint_size = 2;
        col.column_type = TypeId::BigVarChar;
        col.column_size = 10;
        let mut row = RowBuffer::alloc(1, 10, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert!(!row.is_null(0));
        assert_eq!(&row.scalar(0, 10)[..2], b"ab");
        assert_eq!(row.cur_size(0), 2);
    }

    #[test]
    fn test_endian_swap_scalar4() {
        let mut r = reader(&0x01020304u32.to_be_bytes());
        r.swap_bytes = true;
        let col = int4_column();
        let mut row = RowBuffer::alloc(1, 4, 0, 0);
        decode_value(&mut r, &col, 0, &mut row).unwrap();
        assert_eq!(
            u32::from_le_bytes(row.scalar(0, 4).try_into().unwrap()),
            0x01020304
        );
    }
}
