//! Result, compute, parameter, and dynamic-statement descriptors.
//!
//! A descriptor is built once per `COLMETADATA`/`RESULT`/`PARAMFMT`/
//! `ROWFMT2` token and then reused for every row that follows, until the
//! next descriptor token replaces it. This module owns both the descriptor
//! shapes (mirroring the Data Model) and the decoders that build them from
//! the wire.

use crate::error::ProtocolError;
use crate::prelude::*;
use crate::reader::{ByteSource, WireReader};
use crate::row::{align_up, bitmap_len, NumericCell, RowBuffer};
use crate::types::{varint_size, TypeId};
use crate::version::TdsVersion;

/// 5-byte TDS 8 collation: LCID + sort flags, plus an explicit sort id byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collation {
    /// LCID and collation flag bits, packed as on the wire.
    pub lcid_and_flags: u32,
    /// Explicit Sybase-style sort id (0 under Windows collations).
    pub sort_id: u8,
}

impl Collation {
    /// Locale id, the low 20 bits of `lcid_and_flags`.
    #[must_use]
    pub fn lcid(&self) -> u32 {
        self.lcid_and_flags & crate::collation::LCID_MASK
    }
}

/// Per-column nullability/identity/writeability, decoded from either the
/// TDS 7+ 16-bit flag word or a pre-TDS7 byte whose bit assignment this
/// crate reproduces exactly, bug included (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnDescFlags {
    /// Column accepts NULL.
    pub nullable: bool,
    /// Column can be targeted by an UPDATE/INSERT (Sybase: "may be null or
    /// updated").
    pub writeable: bool,
    /// Column is an identity column.
    pub identity: bool,
    /// Column is hidden from `SELECT *`.
    pub hidden: bool,
}

impl ColumnDescFlags {
    /// Decode the pre-TDS7 single-byte flag field. FreeTDS compares the
    /// masked bits against `1` rather than `0` here
    /// (`(flags & 0x10) > 1`); this crate reproduces that comparison
    /// exactly rather than "fixing" it, since a clean `!= 0` would only
    /// diverge from decades of servers that are interoperable with the
    /// buggy reference client. See `DESIGN.md`.
    #[must_use]
    pub fn from_legacy_byte(flags: u8) -> Self {
        Self {
            writeable: (flags & 0x10) > 1,
            nullable: (flags & 0x20) > 1,
            identity: (flags & 0x40) > 1,
            hidden: false,
        }
    }

    /// Decode the TDS 7+ 16-bit flag word.
    #[must_use]
    pub fn from_tds7_bits(flags: u16) -> Self {
        Self {
            nullable: flags & 0x0001 != 0,
            writeable: (flags >> 2) & 0x03 != 0,
            identity: flags & 0x0010 != 0,
            hidden: flags & 0x2000 != 0,
        }
    }
}

/// Storage class a decoded column occupies in a [`RowBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    /// Inline scalar bytes at a fixed offset.
    Scalar,
    /// A [`NumericCell`] slot.
    Numeric,
    /// A [`crate::row::BlobCell`] slot.
    Blob,
}

/// Column metadata, shared by regular results, compute results, and
/// parameter descriptors.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name (empty for most parameter columns).
    pub name: String,
    /// Cardinal (folded) type used for decode dispatch.
    pub column_type: TypeId,
    /// Raw on-wire type byte, kept for round-tripping/logging.
    pub column_type_save: u8,
    /// Varint-size class: 0, 1, 2, or 4.
    pub varint_size: u8,
    /// Declared maximum size in bytes (fixed types: the fixed size).
    pub column_size: usize,
    /// Declared precision, for NUMERIC/DECIMAL.
    pub column_prec: u8,
    /// Declared scale, for NUMERIC/DECIMAL.
    pub column_scale: u8,
    /// TDS 8 collation, present only for `has_collation()` types.
    pub collation: Collation,
    /// Nullability/identity/writeability.
    pub flags: ColumnDescFlags,
    /// Server-defined user type id (0 = none).
    pub usertype: u32,
    /// Aggregate operator, for compute columns only (e.g. SUM, AVG).
    pub operator: u8,
    /// 1-based source column the aggregate operates over, compute only.
    pub operand: u8,
    /// Byte offset into the owning descriptor's row buffer.
    pub offset: usize,
    /// Which storage class this column uses.
    pub cell_class: CellClass,
    /// Slot index into `RowBuffer`'s numeric/blob arrays, if applicable.
    pub cell_slot: usize,
}

impl ColumnInfo {
    fn footprint(&self) -> usize {
        match self.cell_class {
            CellClass::Scalar => align_up(self.column_size.max(1)),
            CellClass::Numeric => NumericCell::footprint(),
            CellClass::Blob => crate::row::BlobCell::footprint(),
        }
    }
}

/// A result-set (or parameter/dynamic) descriptor: ordered columns plus the
/// row-buffer layout computed from them.
#[derive(Debug, Clone, Default)]
pub struct ResultInfo {
    /// Ordered column descriptors.
    pub columns: Vec<ColumnInfo>,
    row_size: usize,
    num_numeric: usize,
    num_blob: usize,
    /// Rows seen so far under this descriptor.
    pub row_count: i32,
    /// Whether at least one row has arrived.
    pub rows_exist: bool,
    /// Whether the server signaled more result sets will follow this one.
    pub more_results: bool,
}

impl ResultInfo {
    /// Build a descriptor from decoded columns, assigning row-buffer
    /// offsets and cell slots in declaration order.
    #[must_use]
    pub fn with_columns(mut columns: Vec<ColumnInfo>) -> Self {
        let mut offset = 0;
        let mut num_numeric = 0;
        let mut num_blob = 0;
        for col in &mut columns {
            col.offset = offset;
            col.cell_slot = match col.cell_class {
                CellClass::Scalar => 0,
                CellClass::Numeric => {
                    let slot = num_numeric;
                    num_numeric += 1;
                    slot
                }
                CellClass::Blob => {
                    let slot = num_blob;
                    num_blob += 1;
                    slot
                }
            };
            offset += col.footprint();
        }
        Self {
            columns,
            row_size: offset,
            num_numeric,
            num_blob,
            row_count: 0,
            rows_exist: false,
            more_results: false,
        }
    }

    /// Append a single column, recomputing the affected layout. Used by
    /// `PARAM`/`PARAMFMT` streams, which grow one column at a time rather
    /// than arriving with an upfront count.
    pub fn push_column(&mut self, mut col: ColumnInfo) {
        col.offset = self.row_size;
        col.cell_slot = match col.cell_class {
            CellClass::Scalar => 0,
            CellClass::Numeric => {
                let slot = self.num_numeric;
                self.num_numeric += 1;
                slot
            }
            CellClass::Blob => {
                let slot = self.num_blob;
                self.num_blob += 1;
                slot
            }
        };
        self.row_size += col.footprint();
        self.columns.push(col);
    }

    /// Allocate a row buffer matching this descriptor's layout.
    #[must_use]
    pub fn alloc_row(&self) -> RowBuffer {
        RowBuffer::alloc(
            self.columns.len(),
            self.row_size,
            self.num_numeric,
            self.num_blob,
        )
    }

    /// Total row size: NULL bitmap plus scalar/cell payload.
    #[must_use]
    pub fn row_size(&self) -> usize {
        bitmap_len(self.columns.len()) + self.row_size
    }
}

/// A `COMPUTE` result descriptor: a [`ResultInfo`] tagged with the
/// `computeid` from its owning `COMPUTE` clause and the 1-based source
/// column positions it partitions by.
#[derive(Debug, Clone)]
pub struct ComputeInfo {
    /// Shared column/row-layout state.
    pub base: ResultInfo,
    /// Identifies which `COMPUTE` clause this descriptor serves.
    pub computeid: i16,
    /// 1-based column positions partitioning the compute (`BY` clause).
    pub bycolumns: Vec<u8>,
}

/// Parameter descriptor, identical in shape to [`ResultInfo`] but always
/// built by repeated [`ResultInfo::push_column`] calls as `PARAM`/
/// `PARAMFMT` tokens arrive.
pub type ParamInfo = ResultInfo;

/// A registered prepared statement.
#[derive(Debug, Clone)]
pub struct Dynamic {
    /// Client-chosen statement id (≤ 30 bytes).
    pub id: String,
    /// Server-assigned numeric id, if the dialect uses one (TDS 5.0).
    pub num_id: i32,
    /// Parameter descriptor for this statement.
    pub params: ParamInfo,
}

fn cell_class_for(type_id: TypeId) -> CellClass {
    if type_id.is_numeric() {
        CellClass::Numeric
    } else if type_id.is_blob() {
        CellClass::Blob
    } else {
        CellClass::Scalar
    }
}

fn fold_cardinal_type(raw: u8) -> Result<TypeId, ProtocolError> {
    TypeId::from_u8(raw).ok_or(ProtocolError::InvalidDataType(raw))
}

/// Decode one column's type/size/precision/collation block (the portion
/// shared by `COLMETADATA`, `PARAMFMT`, and compute-column descriptors on
/// TDS 7+), not including the flag word, user type, or trailing name.
fn decode_type_info<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
) -> Result<
    (
        TypeId,
        u8,
        u8,
        usize,
        u8,
        u8,
        Collation,
        CellClass,
    ),
    ProtocolError,
> {
    let type_byte = reader.get_u8()?;
    let column_type = fold_cardinal_type(type_byte)?;
    let vsize = varint_size(column_type);

    let mut column_size = column_type.fixed_size().unwrap_or(0);
    let mut prec = 0u8;
    let mut scale = 0u8;
    let mut collation = Collation::default();

    match vsize {
        1 => column_size = reader.get_u8()? as usize,
        2 => column_size = reader.get_u16()? as usize,
        4 => column_size = reader.get_u32()? as usize,
        _ => {}
    }

    if column_type.has_collation() && version.is_tds_8() {
        collation.lcid_and_flags = reader.get_u32()?;
        collation.sort_id = reader.get_u8()?;
    }

    if column_type.is_numeric() {
        prec = reader.get_u8()?;
        scale = reader.get_u8()?;
        if prec == 0 || prec as usize >= crate::types::NUMERIC_BYTES_PER_PREC.len() {
            return Err(ProtocolError::NumericOverflow { precision: prec });
        }
    }

    let cell_class = cell_class_for(column_type);
    Ok((
        column_type,
        type_byte,
        vsize,
        column_size,
        prec,
        scale,
        collation,
        cell_class,
    ))
}

fn decode_column_tds7<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
    with_name: bool,
) -> Result<ColumnInfo, ProtocolError> {
    let usertype = if version >= TdsVersion::V7_2 {
        reader.get_u32()?
    } else {
        reader.get_u16()? as u32
    };
    let flags = reader.get_u16()?;
    let (column_type, type_byte, vsize, column_size, prec, scale, collation, cell_class) =
        decode_type_info(reader, version)?;

    let name = if with_name {
        reader.get_b_varchar(true, collation.lcid())?
    } else {
        String::new()
    };

    Ok(ColumnInfo {
        name,
        column_type,
        column_type_save: type_byte,
        varint_size: vsize,
        column_size,
        column_prec: prec,
        column_scale: scale,
        collation,
        flags: ColumnDescFlags::from_tds7_bits(flags),
        usertype,
        operator: 0,
        operand: 0,
        offset: 0,
        cell_class,
        cell_slot: 0,
    })
}

/// Decode a `COLMETADATA` token body (TDS 7.0–8.0 regular result
/// descriptor).
pub fn decode_colmetadata<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
) -> Result<ResultInfo, ProtocolError> {
    let count = reader.get_u16()?;
    if count == 0xFFFF {
        return Ok(ResultInfo::default());
    }
    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        columns.push(decode_column_tds7(reader, version, true)?);
    }
    Ok(ResultInfo::with_columns(columns))
}

/// Decode one `PARAMFMT`/`PARAMFMT2` column and append it to `params`.
pub fn decode_paramfmt_column<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
    params: &mut ParamInfo,
) -> Result<(), ProtocolError> {
    let col = decode_column_tds7(reader, version, true)?;
    params.push_column(col);
    Ok(())
}

fn decode_column_tds5<R: ByteSource>(
    reader: &mut WireReader<R>,
) -> Result<ColumnInfo, ProtocolError> {
    let name = reader.get_b_varchar(false, 0)?;
    let flags_byte = reader.get_u8()?;
    let usertype = reader.get_u32()?;
    let type_byte = reader.get_u8()?;
    let column_type = fold_cardinal_type(type_byte)?;
    let vsize = varint_size(column_type);

    let mut column_size = column_type.fixed_size().unwrap_or(0);
    match vsize {
        1 => column_size = reader.get_u8()? as usize,
        2 => column_size = reader.get_u16()? as usize,
        4 => {
            column_size = reader.get_u32()? as usize;
            // Blob-typed TDS5 columns carry a trailing table name, absent
            // from every other varint-size class.
            let table_name_len = reader.get_u16()? as usize;
            let _ = reader.get_bytes(table_name_len)?;
        }
        _ => {}
    }

    let (prec, scale) = if column_type.is_numeric() {
        let p = reader.get_u8()?;
        let s = reader.get_u8()?;
        (p, s)
    } else {
        (0, 0)
    };

    Ok(ColumnInfo {
        name,
        column_type,
        column_type_save: type_byte,
        varint_size: vsize,
        column_size,
        column_prec: prec,
        column_scale: scale,
        collation: Collation::default(),
        flags: ColumnDescFlags::from_legacy_byte(flags_byte),
        usertype,
        operator: 0,
        operand: 0,
        offset: 0,
        cell_class: cell_class_for(column_type),
        cell_slot: 0,
    })
}

/// Decode a TDS 5.0 `RESULT`/`PARAMFMT` token body.
pub fn decode_tds5_result<R: ByteSource>(
    reader: &mut WireReader<R>,
) -> Result<ResultInfo, ProtocolError> {
    let count = reader.get_u16()?;
    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        columns.push(decode_column_tds5(reader)?);
        // Every TDS5 RESULT column carries a trailing per-column locale
        // block the client must discard to stay in sync.
        let locale_len = reader.get_u8()?;
        let _ = reader.get_bytes(locale_len as usize)?;
    }
    Ok(ResultInfo::with_columns(columns))
}

/// Decode a TDS 4.2 `COL_NAME` token: a flat list of column names with no
/// type information, paired with a later `COL_INFO` token by position.
pub fn decode_col_name_tds42<R: ByteSource>(
    reader: &mut WireReader<R>,
    token_len: u16,
) -> Result<Vec<String>, ProtocolError> {
    let mut remaining = token_len as i64;
    let mut names = Vec::new();
    while remaining > 0 {
        let namelen = reader.get_u8()?;
        let name = reader.get_char_data(namelen as usize, false, 0)?;
        remaining -= 1 + namelen as i64;
        names.push(name);
    }
    Ok(names)
}

/// Decode a TDS 4.2 `COL_INFO` token and merge it with names collected
/// from a preceding `COL_NAME` token.
pub fn decode_col_info_tds42<R: ByteSource>(
    reader: &mut WireReader<R>,
    token_len: u16,
    names: Vec<String>,
) -> Result<ResultInfo, ProtocolError> {
    let mut remaining = token_len as i64;
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        if remaining < 5 {
            break;
        }
        // TDS 4.2 COL_INFO carries no usertype field: four raw flag bytes
        // (only ci_flags[3] is meaningful) followed by the datatype byte.
        let ci_flags: [u8; 4] = reader.get_array()?;
        let type_byte = reader.get_u8()?;
        remaining -= 5;
        let column_type = fold_cardinal_type(type_byte)?;
        let vsize = varint_size(column_type);
        let mut column_size = column_type.fixed_size().unwrap_or(0);
        match vsize {
            1 => {
                column_size = reader.get_u8()? as usize;
                remaining -= 1;
            }
            2 => {
                column_size = reader.get_u16()? as usize;
                remaining -= 2;
            }
            4 => {
                column_size = reader.get_u32()? as usize;
                remaining -= 4;
            }
            _ => {}
        }
        columns.push(ColumnInfo {
            name,
            column_type,
            column_type_save: type_byte,
            varint_size: vsize,
            column_size,
            column_prec: 0,
            column_scale: 0,
            collation: Collation::default(),
            flags: ColumnDescFlags::from_legacy_byte(ci_flags[3]),
            usertype: 0,
            operator: 0,
            operand: 0,
            offset: 0,
            cell_class: cell_class_for(column_type),
            cell_slot: 0,
        });
    }
    Ok(ResultInfo::with_columns(columns))
}

/// Display name FreeTDS synthesizes for an aggregate compute column whose
/// on-wire name length is zero, keyed by the standard TDS aggregate
/// operator byte.
fn synthesize_compute_name(operator: u8) -> String {
    match operator {
        0x4B => String::from("count"),
        0x4D => String::from("sum"),
        0x4F => String::from("avg"),
        0x51 => String::from("min"),
        0x52 => String::from("max"),
        _ => String::new(),
    }
}

/// Decode a `ALTMETADATA`-style compute descriptor (TDS 7+): a column
/// count, `computeid`, `BY` column list, then one full column body per
/// aggregate preceded by a 1-byte operator and a 2-byte operand (source
/// column).
pub fn decode_compute_result_tds7<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
) -> Result<ComputeInfo, ProtocolError> {
    let num_cols = reader.get_u16()?;
    let computeid = reader.get_i16()?;
    let by_count = reader.get_u8()?;
    let mut bycolumns = Vec::with_capacity(by_count as usize);
    for _ in 0..by_count {
        bycolumns.push(reader.get_i16()? as u8);
    }

    let mut columns = Vec::with_capacity(num_cols as usize);
    for _ in 0..num_cols {
        let operator = reader.get_u8()?;
        let operand = reader.get_i16()? as u8;
        // Compute columns are decoded through the full column body, name
        // included; a zero-length name means the server expects the
        // client to synthesize one from the aggregate operator.
        let mut col = decode_column_tds7(reader, version, true)?;
        if col.name.is_empty() {
            col.name = synthesize_compute_name(operator);
        }
        col.operator = operator;
        col.operand = operand;
        columns.push(col);
    }

    Ok(ComputeInfo {
        base: ResultInfo::with_columns(columns),
        computeid,
        bycolumns,
    })
}

/// Decode a TDS 5.0 `COMPUTE` result token body (preceded on the wire by a
/// separate `COMPUTE_NAMES` token handled by the caller). Compute columns
/// in this dialect have no name field, and no precision/scale fields
/// (aggregates never need them), but each still carries the per-column
/// locale block every TDS5 column carries.
pub fn decode_compute_result_tds5<R: ByteSource>(
    reader: &mut WireReader<R>,
) -> Result<ComputeInfo, ProtocolError> {
    let _hdr_len = reader.get_u16()?;
    let computeid = reader.get_i16()?;
    let num_cols = reader.get_u8()?;
    let mut columns = Vec::with_capacity(num_cols as usize);
    for _ in 0..num_cols {
        let operator = reader.get_u8()?;
        let operand = reader.get_u8()?;
        let usertype = reader.get_u32()?;
        let type_byte = reader.get_u8()?;
        let column_type = fold_cardinal_type(type_byte)?;
        let vsize = varint_size(column_type);
        let mut column_size = column_type.fixed_size().unwrap_or(0);
        match vsize {
            1 => column_size = reader.get_u8()? as usize,
            2 => column_size = reader.get_u16()? as usize,
            4 => column_size = reader.get_u32()? as usize,
            _ => {}
        }
        let locale_len = reader.get_u8()?;
        let _ = reader.get_bytes(locale_len as usize)?;

        columns.push(ColumnInfo {
            name: String::new(),
            column_type,
            column_type_save: type_byte,
            varint_size: vsize,
            column_size,
            column_prec: 0,
            column_scale: 0,
            collation: Collation::default(),
            flags: ColumnDescFlags::default(),
            usertype,
            operator,
            operand,
            offset: 0,
            cell_class: cell_class_for(column_type),
            cell_slot: 0,
        });
    }

    let by_count = reader.get_u8()?;
    let mut bycolumns = Vec::with_capacity(by_count as usize);
    for _ in 0..by_count {
        bycolumns.push(reader.get_u8()?);
    }

    Ok(ComputeInfo {
        base: ResultInfo::with_columns(columns),
        computeid,
        bycolumns,
    })
}

/// Decode a `COMPUTE_NAMES` token (TDS 5.0): names announced ahead of the
/// `COMPUTE` descriptor that will reuse them by position.
pub fn decode_compute_names<R: ByteSource>(
    reader: &mut WireReader<R>,
    token_len: u16,
) -> Result<Vec<String>, ProtocolError> {
    decode_col_name_tds42(reader, token_len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reader::ByteSource;

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

    #[test]
    fn test_legacy_flag_bug_preserved() {
        // Only bit 0x10 set: masked value is 0x10, which is > 1, so the
        // (buggy) comparison still reports writeable = true here. The bug
        // only diverges from a clean `!= 0` when *no* bits above the
        // compared one are part of the mask, which never happens for these
        // single-bit masks - so this test documents equivalence for the
        // single-bit case and is a regression guard if the comparison
        // style changes.
        let flags = ColumnDescFlags::from_legacy_byte(0x10);
        assert!(flags.writeable);
        assert!(!flags.nullable);
    }

    #[test]
    fn test_decode_colmetadata_single_int_column() {
        let mut data = vec![1, 0]; // column count = 1
        data.extend_from_slice(&0u32.to_le_bytes()); // usertype
        data.extend_from_slice(&0u16.to_le_bytes()); // flags
        data.push(0x38); // Int4
        data.push(1); // name length = 1 char
        data.extend_from_slice(&(b'x' as u16).to_le_bytes());
        let mut r = reader(&data);
        let info = decode_colmetadata(&mut r, TdsVersion::V7_4).unwrap();
        assert_eq!(info.columns.len(), 1);
        assert_eq!(info.columns[0].name, "x");
        assert_eq!(info.columns[0].column_type, TypeId::Int4);
        assert_eq!(info.columns[0].offset, 0);
    }

    #[test]
    fn test_push_column_grows_offsets() {
        let mut params = ParamInfo::default();
        let col_a = decode_column_tds5(&mut reader({
            // no name, flags=0, usertype=0 (4 bytes), Int1
            static DATA: &[u8] = &[0, 0, 0, 0, 0, 0, 0x30];
            DATA
        }))
        .unwrap();
        let first_offset = col_a.offset;
        params.push_column(col_a);
        assert_eq!(first_offset, 0);
        assert_eq!(params.columns[0].offset, 0);
    }
}
