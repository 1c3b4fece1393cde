//! End-to-end scenarios spanning descriptor decode, row decode, and the
//! session state machine together, as opposed to the per-module unit tests
//! living alongside each decoder.

#![allow(clippy::unwrap_used)]

use tds_tokens::{
    process_login_tokens, process_result_tokens, process_row_tokens, ByteSource, EnvChangeRecord,
    MsgInfo, MsgSink, RowOutcome, Session, SessionState, TokenOutcome, WireReader,
};

struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl ByteSource for SliceSource {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), tds_tokens::ProtocolError> {
        if self.pos + buf.len() > self.data.len() {
            return Err(tds_tokens::ProtocolError::UnexpectedEof);
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
}

fn reader(data: Vec<u8>) -> WireReader<SliceSource> {
    WireReader::new(SliceSource { data, pos: 0 })
}

struct NullSinks;

impl MsgSink for NullSinks {
    fn on_message(&mut self, _msg: &MsgInfo, _is_error: bool) -> bool {
        false
    }
}

impl tds_tokens::EnvSink for NullSinks {
    fn on_env_change(&mut self, _change: &EnvChangeRecord) {}
}

fn colmetadata_two_bigvarchar() -> Vec<u8> {
    let mut data = vec![];
    data.extend_from_slice(&2u16.to_le_bytes()); // column count
    for _ in 0..2 {
        data.extend_from_slice(&0u32.to_le_bytes()); // usertype
        data.extend_from_slice(&0u16.to_le_bytes()); // flags
        data.push(0xA7); // BigVarChar
        data.extend_from_slice(&20u16.to_le_bytes()); // column_size
        data.extend_from_slice(&0x0000_0409u32.to_le_bytes()); // lcid/flags
        data.push(0); // sort_id
        data.push(0); // name len 0
    }
    data
}

#[test]
fn simple_select_one_row() {
    let mut data = vec![0x81u8]; // COLMETADATA
    data.extend_from_slice(&1u16.to_le_bytes()); // 1 column
    data.extend_from_slice(&0u32.to_le_bytes()); // usertype
    data.extend_from_slice(&0u16.to_le_bytes()); // flags
    data.push(0x38); // Int4
    data.push(1); // name len
    data.extend_from_slice(&(b'x' as u16).to_le_bytes());

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_4);
    let mut sinks = NullSinks;

    let outcome = process_result_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::RowFmtResult);

    let mut row_data = vec![0xD1u8];
    row_data.extend_from_slice(&99i32.to_le_bytes());
    row_data.push(0xFD); // DONE
    row_data.extend_from_slice(&0x0010u16.to_le_bytes()); // COUNT set, no MORE
    row_data.extend_from_slice(&0u16.to_le_bytes());
    row_data.extend_from_slice(&1u32.to_le_bytes()); // row count = 1 (always 4 bytes)

    let mut r2 = reader(row_data);
    let (outcome, row) = process_row_tokens(&mut r2, &mut session).unwrap();
    assert_eq!(outcome, RowOutcome::RegRow);
    let row = row.unwrap();
    assert_eq!(i32::from_le_bytes(row.scalar(0, 4).try_into().unwrap()), 99);

    let (no_more, row) = process_row_tokens(&mut r2, &mut session).unwrap();
    assert_eq!(no_more, RowOutcome::NoMoreRows);
    assert!(row.is_none());

    let final_outcome = process_result_tokens(&mut r2, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(final_outcome, TokenOutcome::CmdSucceed);
    assert_eq!(session.rows_affected, 1);
}

#[test]
fn null_and_empty_non_null_varchar() {
    let mut data = vec![0x81u8];
    data.extend_from_slice(&colmetadata_two_bigvarchar());

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_4);
    let mut sinks = NullSinks;
    let outcome = process_result_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::RowFmtResult);

    let mut row_data = vec![0xD1u8];
    row_data.extend_from_slice(&0xFFFFu16.to_le_bytes()); // column 0: NULL
    row_data.extend_from_slice(&0u16.to_le_bytes()); // column 1: empty string, not NULL

    let mut r2 = reader(row_data);
    let (outcome, row) = process_row_tokens(&mut r2, &mut session).unwrap();
    assert_eq!(outcome, RowOutcome::RegRow);
    let row = row.unwrap();
    assert!(row.is_null(0));
    assert!(!row.is_null(1));
}

#[test]
fn numeric_endian_swap_on_scalar_column() {
    let mut data = vec![0x81u8];
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.push(0x38); // Int4
    data.push(0);

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_4);
    let mut sinks = NullSinks;
    process_result_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();

    let mut row_data = vec![0xD1u8];
    row_data.extend_from_slice(&0x0102_0304u32.to_be_bytes());
    let mut r2 = reader(row_data);
    r2.swap_bytes = true;
    let (outcome, row) = process_row_tokens(&mut r2, &mut session).unwrap();
    assert_eq!(outcome, RowOutcome::RegRow);
    let row = row.unwrap();
    assert_eq!(
        u32::from_le_bytes(row.scalar(0, 4).try_into().unwrap()),
        0x0102_0304
    );
}

#[test]
fn compute_with_by_clause_tds7() {
    let mut data = vec![0x81u8]; // regular result: one Int4 column to compute over
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.push(0x38);
    data.push(1);
    data.extend_from_slice(&(b'n' as u16).to_le_bytes());

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_4);
    let mut sinks = NullSinks;
    let outcome = process_result_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::RowFmtResult);

    let mut alt = vec![0x88u8]; // ALTMETADATA
    alt.extend_from_slice(&1u16.to_le_bytes()); // num_cols
    alt.extend_from_slice(&7i16.to_le_bytes()); // computeid
    alt.push(1); // by_count
    alt.extend_from_slice(&1i16.to_le_bytes()); // bycolumns[0] = column 1
    alt.push(0x4d); // operator: SUM
    alt.extend_from_slice(&1i16.to_le_bytes()); // operand = column 1
    alt.extend_from_slice(&0u32.to_le_bytes()); // usertype
    alt.extend_from_slice(&0u16.to_le_bytes()); // flags
    alt.push(0x38); // Int4 aggregate result type
    alt.push(0); // name length 0 -> decoder synthesizes "sum"

    let mut r_alt = reader(alt);
    let outcome = process_result_tokens(&mut r_alt, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::ComputeFmtResult);
    assert_eq!(session.comp_info.len(), 1);
    assert_eq!(session.comp_info[0].computeid, 7);
    assert_eq!(session.comp_info[0].bycolumns, vec![1]);

    let mut altrow = vec![0xD3u8]; // ALTROW
    altrow.extend_from_slice(&7i16.to_le_bytes());
    altrow.extend_from_slice(&55i32.to_le_bytes());
    let mut r_row = reader(altrow);
    let (outcome, row) = process_row_tokens(&mut r_row, &mut session).unwrap();
    assert_eq!(outcome, RowOutcome::CompRow(7));
    let row = row.unwrap();
    assert_eq!(i32::from_le_bytes(row.scalar(0, 4).try_into().unwrap()), 55);
}

#[test]
fn output_parameter_from_prepared_statement() {
    // TDS 7.2: no leading param-ordinal field (that's 7.4+), usertype is
    // 4 bytes, name is UTF-16LE with a 1-byte character-count prefix.
    let mut data = vec![0xACu8]; // RETURNVALUE (PARAM/RETURNVALUE marker on TDS7+)
    data.push(3); // name length, 3 chars
    for c in "@rc".encode_utf16() {
        data.extend_from_slice(&c.to_le_bytes());
    }
    data.push(0); // status
    data.extend_from_slice(&0u32.to_le_bytes()); // usertype (V7_2+: 4 bytes)
    data.extend_from_slice(&0u16.to_le_bytes()); // flags
    data.push(0x38); // Int4
    data.extend_from_slice(&123i32.to_le_bytes()); // value

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_2);
    let mut sinks = NullSinks;
    let outcome = process_result_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::ParamResult);
    let params = session.param_info.as_ref().unwrap();
    assert_eq!(params.columns.len(), 1);
    assert_eq!(params.columns[0].name, "@rc");
}

#[test]
fn login_then_legacy_spid_fallback() {
    let mut data = vec![0xADu8]; // LOGINACK
    data.extend_from_slice(&0u16.to_le_bytes()); // length (unused by decoder)
    data.push(1); // interface
    data.extend_from_slice(&tds_tokens::TdsVersion::V7_0.raw().to_le_bytes());
    data.push(4); // prog name len
    for c in "test".encode_utf16() {
        data.extend_from_slice(&c.to_le_bytes());
    }
    data.extend_from_slice(&0u32.to_le_bytes()); // prog version
    data.push(0xFD); // DONE
    data.extend_from_slice(&0u16.to_le_bytes()); // status = 0 (no error, no more)
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // row count

    let mut r = reader(data);
    let mut session = Session::new(tds_tokens::TdsVersion::V7_0);
    let mut sinks = NullSinks;
    let outcome = process_login_tokens(&mut r, &mut session, &mut sinks, &mut sinks).unwrap();
    assert_eq!(outcome, TokenOutcome::CmdSucceed);
    assert_eq!(session.state, SessionState::Idle);
    assert!(session.needs_spid_fallback());

    session.spid = 55;
    assert!(!session.needs_spid_fallback());
}
