//! The token dispatcher: the public state machine that pulls token markers
//! off the wire and routes them to descriptor decoders, value decoders, or
//! message handling, mutating [`Session`] as it goes.

use bitflags::bitflags;

use crate::descriptor;
use crate::error::ProtocolError;
use crate::message::{self, EnvSink, MsgSink};
use crate::prelude::*;
use crate::reader::{ByteSource, WireReader};
use crate::session::{CurrResInfo, Session, SessionState};
use crate::value;
use crate::version::TdsVersion;

bitflags! {
    /// `DONE`/`DONEPROC`/`DONEINPROC` status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DoneStatus: u16 {
        /// More `DONE` packets follow for this command (batches with
        /// multiple statements).
        const MORE = 0x0001;
        /// The command encountered an error.
        const ERROR = 0x0002;
        /// The command occurred inside a transaction.
        const INXACT = 0x0004;
        /// `row_count` is valid (the command produced a row count).
        const COUNT = 0x0010;
        /// This `DONE` acknowledges a cancel (`ATTENTION`) request.
        const ATTN = 0x0020;
        /// A fatal server error occurred.
        const SRVERROR = 0x0100;
    }
}

/// A decoded `DONE`/`DONEPROC`/`DONEINPROC` token.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// The T-SQL token of the command that finished (opaque to this
    /// crate; forwarded for diagnostics).
    pub cur_cmd: u16,
    /// Row count, valid only when `status` has [`DoneStatus::COUNT`] set.
    pub row_count: u64,
}

fn decode_done<R: ByteSource>(reader: &mut WireReader<R>) -> Result<Done, ProtocolError> {
    let status = DoneStatus::from_bits_truncate(reader.get_u16()?);
    let cur_cmd = reader.get_u16()?;
    let row_count = reader.get_u32()? as u64;
    Ok(Done {
        status,
        cur_cmd,
        row_count,
    })
}

/// Token marker byte, folded into one canonical meaning per value. Several
/// bytes carry different meanings across protocol generations (the
/// "switch-over marker" pattern: the dispatcher, not the enum, resolves
/// which meaning applies, using the session's negotiated version).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenMarker {
    /// `OFFSET`: byte offsets of clauses within the original SQL text.
    Offset = 0x78,
    /// `RETURNSTATUS`: stored procedure return code.
    ReturnStatus = 0x79,
    /// `COLMETADATA`: TDS 7+ regular result descriptor.
    ColMetaData = 0x81,
    /// `DYNAMIC`/`DYNAMIC2`: prepared statement (de)registration.
    Dynamic = 0x83,
    /// `ALTMETADATA`: TDS 7+ compute result descriptor.
    AltMetaData = 0x88,
    /// `COL_NAME`: TDS 4.2 result descriptor, names only (first token).
    ColName = 0xA0,
    /// `CAPABILITY`: TDS 5.0 capability negotiation.
    Capability = 0xE2,
    /// `TABNAME` (TDS 7+ browse mode) / `COMPUTE_NAMES` (TDS 5.0).
    TabNameOrComputeNames = 0xA4,
    /// `COLINFO` (TDS 7+ browse mode) / `COL_INFO` (TDS 4.2, second token)
    /// / `RESULT` (TDS 5.0, single-token descriptor).
    ColInfoOrResult = 0xA5,
    /// `COMPUTE` result descriptor (TDS 5.0).
    TdsComputeResult = 0xA6,
    /// `ORDER`: ORDER BY column positions.
    Order = 0xA9,
    /// `ERROR`: server-reported error.
    Error = 0xAA,
    /// `INFO`: server-reported informational message.
    Info = 0xAB,
    /// `PARAM` (TDS 5.0 parameter value) / `RETURNVALUE` (TDS 7+ output
    /// parameter).
    ParamOrReturnValue = 0xAC,
    /// `LOGINACK`: login acknowledgement.
    LoginAck = 0xAD,
    /// `FEATUREEXTACK`: negotiated feature list.
    FeatureExtAck = 0xAE,
    /// `ROW`: a regular result row.
    Row = 0xD1,
    /// `NBCROW`: a row using the null-bitmap-compressed layout.
    NbcRow = 0xD2,
    /// `ALTROW`: a compute row.
    AltRow = 0xD3,
    /// `ENVCHANGE`: environment change notification.
    EnvChange = 0xE3,
    /// `SESSIONSTATE`: connection resiliency state blob.
    SessionState = 0xE4,
    /// `SSPI`: authentication challenge.
    Sspi = 0xED,
    /// `FEDAUTHINFO`: federated authentication redirect info.
    FedAuthInfo = 0xEE,
    /// `DONE`: command completion.
    Done = 0xFD,
    /// `DONEPROC`: stored procedure completion.
    DoneProc = 0xFE,
    /// `DONEINPROC`: completion of one statement within a procedure.
    DoneInProc = 0xFF,
}

impl TokenMarker {
    fn from_u8(b: u8) -> Option<Self> {
        use TokenMarker::*;
        Some(match b {
            0x78 => Offset,
            0x79 => ReturnStatus,
            0x81 => ColMetaData,
            0x83 => Dynamic,
            0x88 => AltMetaData,
            0xA0 => ColName,
            0xE2 => Capability,
            0xA4 => TabNameOrComputeNames,
            0xA5 => ColInfoOrResult,
            0xA6 => TdsComputeResult,
            0xA9 => Order,
            0xAA => Error,
            0xAB => Info,
            0xAC => ParamOrReturnValue,
            0xAD => LoginAck,
            0xAE => FeatureExtAck,
            0xD1 => Row,
            0xD2 => NbcRow,
            0xD3 => AltRow,
            0xE3 => EnvChange,
            0xE4 => SessionState,
            0xED => Sspi,
            0xEE => FedAuthInfo,
            0xFD => Done,
            0xFE => DoneProc,
            0xFF => DoneInProc,
            _ => return None,
        })
    }
}

/// What a `process_result_tokens` call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// No further result sets; the batch is fully drained.
    NoMoreResults,
    /// A regular result descriptor is ready; call `process_row_tokens`
    /// next.
    RowFmtResult,
    /// A compute result descriptor is ready.
    ComputeFmtResult,
    /// A parameter descriptor grew (more `PARAM`/`PARAMFMT` to come, or
    /// complete).
    ParamResult,
    /// A stored-procedure return status arrived.
    StatusResult,
    /// The command completed successfully (`DONE` without `ERROR`).
    CmdSucceed,
    /// `DONE` with no error and no further descriptor.
    CmdDone,
    /// The command failed (`DONE`/`DONEPROC` with `ERROR` set, or a fatal
    /// message).
    CmdFail,
}

/// What a `process_row_tokens` call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// A regular row was decoded into `session.res_info`'s row buffer.
    RegRow,
    /// A compute row was decoded, tagged with its `computeid`.
    CompRow(i16),
    /// No more rows under the current descriptor.
    NoMoreRows,
}

fn fail_from_done(done: &Done) -> TokenOutcome {
    if done.status.contains(DoneStatus::ERROR) || done.status.contains(DoneStatus::SRVERROR) {
        TokenOutcome::CmdFail
    } else if done.status.contains(DoneStatus::MORE) {
        TokenOutcome::CmdDone
    } else {
        TokenOutcome::CmdSucceed
    }
}

/// Decode and dispatch tokens belonging to the result-descriptor phase of
/// a batch: descriptors, messages, environment changes, return status,
/// and completion. Returns as soon as one outcome worth reporting to the
/// caller is available; the caller loops, alternating with
/// [`process_row_tokens`] once a `RowFmtResult`/`ComputeFmtResult` comes
/// back.
pub fn process_result_tokens<R: ByteSource>(
    reader: &mut WireReader<R>,
    session: &mut Session,
    msg_sink: &mut dyn MsgSink,
    env_sink: &mut dyn EnvSink,
) -> Result<TokenOutcome, ProtocolError> {
    if session.state == SessionState::Dead {
        return Err(ProtocolError::Dead);
    }
    if session.state == SessionState::Completed {
        return Ok(TokenOutcome::NoMoreResults);
    }

    let mut pending_names: Option<Vec<String>> = None;

    loop {
        let marker_byte = reader.get_u8()?;
        let marker = match TokenMarker::from_u8(marker_byte) {
            Some(m) => m,
            None => return Err(ProtocolError::InvalidTokenType(marker_byte)),
        };

        match marker {
            TokenMarker::ColMetaData => {
                session.reset_result_descriptors();
                let info = descriptor::decode_colmetadata(reader, session.version)?;
                tracing::trace!(num_columns = info.columns.len(), "colmetadata token");
                session.res_info = Some(info);
                session.curr_resinfo = CurrResInfo::Regular;
                return Ok(TokenOutcome::RowFmtResult);
            }
            TokenMarker::ColName => {
                let token_len = reader.get_u16()?;
                pending_names = Some(descriptor::decode_col_name_tds42(reader, token_len)?);
            }
            TokenMarker::ColInfoOrResult => {
                let token_len = reader.get_u16()?;
                let info = if session.version.is_sybase() {
                    if let Some(names) = pending_names.take() {
                        descriptor::decode_col_info_tds42(reader, token_len, names)?
                    } else {
                        descriptor::decode_tds5_result(reader)?
                    }
                } else {
                    // Browse-mode COLINFO: schema-lookup metadata for
                    // client-side updatable cursors, out of scope here.
                    return Err(ProtocolError::InvalidTokenType(marker_byte));
                };
                session.reset_result_descriptors();
                session.res_info = Some(info);
                session.curr_resinfo = CurrResInfo::Regular;
                return Ok(TokenOutcome::RowFmtResult);
            }
            TokenMarker::TabNameOrComputeNames => {
                let token_len = reader.get_u16()?;
                if session.version.is_sybase() {
                    pending_names = Some(descriptor::decode_compute_names(reader, token_len)?);
                } else {
                    return Err(ProtocolError::InvalidTokenType(marker_byte));
                }
            }
            TokenMarker::AltMetaData => {
                let info = descriptor::decode_compute_result_tds7(reader, session.version)?;
                let idx = session.comp_info.len();
                session.comp_info.push(info);
                session.curr_resinfo = CurrResInfo::Compute(idx);
                return Ok(TokenOutcome::ComputeFmtResult);
            }
            TokenMarker::TdsComputeResult => {
                let info = descriptor::decode_compute_result_tds5(reader)?;
                let idx = session.comp_info.len();
                session.comp_info.push(info);
                session.curr_resinfo = CurrResInfo::Compute(idx);
                return Ok(TokenOutcome::ComputeFmtResult);
            }
            TokenMarker::Order => {
                let len = reader.get_u16()? as usize;
                let _ = reader.get_bytes(len)?;
            }
            TokenMarker::ReturnStatus => {
                session.ret_status = Some(reader.get_i32()?);
                return Ok(TokenOutcome::StatusResult);
            }
            TokenMarker::ParamOrReturnValue => {
                let params = session.param_info.get_or_insert_with(Default::default);
                let col_idx = params.columns.len();
                let col = decode_return_value_column(reader, session.version)?;
                params.push_column(col);
                let mut row = params.alloc_row();
                value::decode_value(reader, &params.columns[col_idx], col_idx, &mut row)?;
                session.curr_resinfo = CurrResInfo::Param;
                return Ok(TokenOutcome::ParamResult);
            }
            TokenMarker::Error | TokenMarker::Info => {
                let is_error = marker == TokenMarker::Error;
                let msg = message::decode_msg_info(reader)?;
                tracing::debug!(number = msg.number, class = msg.class, is_error, "server message");
                let fatal = msg.is_fatal();
                if msg_sink.on_message(&msg, is_error) || fatal {
                    session.mark_dead();
                    return Err(ProtocolError::Dead);
                }
            }
            TokenMarker::EnvChange => {
                let change = message::decode_env_change(reader)?;
                env_sink.on_env_change(&change);
            }
            TokenMarker::LoginAck => {
                let ack = message::decode_login_ack(reader)?;
                session.version = ack.tds_version;
                session.product_version = ack.prog_version;
            }
            TokenMarker::FeatureExtAck => {
                skip_feature_ext_ack(reader)?;
            }
            TokenMarker::Dynamic => {
                skip_length_prefixed(reader)?;
            }
            TokenMarker::Capability
            | TokenMarker::SessionState
            | TokenMarker::Sspi
            | TokenMarker::FedAuthInfo
            | TokenMarker::Offset => {
                skip_length_prefixed(reader)?;
            }
            TokenMarker::Done | TokenMarker::DoneProc | TokenMarker::DoneInProc => {
                let done = decode_done(reader)?;
                tracing::trace!(status = ?done.status, row_count = done.row_count, "done token");
                if done.status.contains(DoneStatus::COUNT) {
                    session.rows_affected = done.row_count as i32;
                }
                if !done.status.contains(DoneStatus::MORE) {
                    session.state = SessionState::Completed;
                } else {
                    session.state = SessionState::Pending;
                }
                return Ok(fail_from_done(&done));
            }
            TokenMarker::Row | TokenMarker::NbcRow | TokenMarker::AltRow => {
                // A row arrived before a descriptor described it: push the
                // marker back so `process_row_tokens` can pick it up and
                // report it to the caller as the boundary between phases.
                reader.unget_byte(marker_byte);
                return Ok(TokenOutcome::RowFmtResult);
            }
        }
    }
}

fn decode_return_value_column<R: ByteSource>(
    reader: &mut WireReader<R>,
    version: TdsVersion,
) -> Result<crate::descriptor::ColumnInfo, ProtocolError> {
    let _param_ordinal = if version >= TdsVersion::V7_4 {
        Some(reader.get_u16()?)
    } else {
        None
    };
    let name = reader.get_b_varchar(true, 0)?;
    let _status = reader.get_u8()?;
    let usertype = if version >= TdsVersion::V7_2 {
        reader.get_u32()?
    } else {
        reader.get_u16()? as u32
    };
    let flags = reader.get_u16()?;

    let type_byte = reader.get_u8()?;
    let column_type =
        crate::types::TypeId::from_u8(type_byte).ok_or(ProtocolError::InvalidDataType(type_byte))?;
    let vsize = crate::types::varint_size(column_type);
    let mut column_size = column_type.fixed_size().unwrap_or(0);
    let mut collation = crate::descriptor::Collation::default();
    let mut prec = 0u8;
    let mut scale = 0u8;
    match vsize {
        1 => column_size = reader.get_u8()? as usize,
        2 => column_size = reader.get_u16()? as usize,
        4 => column_size = reader.get_u32()? as usize,
        _ => {}
    }
    if column_type.has_collation() {
        collation.lcid_and_flags = reader.get_u32()?;
        collation.sort_id = reader.get_u8()?;
    }
    if column_type.is_numeric() {
        prec = reader.get_u8()?;
        scale = reader.get_u8()?;
    }

    let cell_class = if column_type.is_numeric() {
        crate::descriptor::CellClass::Numeric
    } else if column_type.is_blob() {
        crate::descriptor::CellClass::Blob
    } else {
        crate::descriptor::CellClass::Scalar
    };

    Ok(crate::descriptor::ColumnInfo {
        name,
        column_type,
        column_type_save: type_byte,
        varint_size: vsize,
        // The value decode path below reads its own length prefix from
        // the wire per-value; `column_size` here is carried through
        // unchanged from the just-decoded declared size rather than
        // re-derived from the eventual value length. See `DESIGN.md` for
        // why this mirrors the original's `column_cur_size` reuse rather
        // than widening it speculatively.
        column_size,
        column_prec: prec,
        column_scale: scale,
        collation,
        flags: crate::descriptor::ColumnDescFlags::from_tds7_bits(flags),
        usertype,
        operator: 0,
        operand: 0,
        offset: 0,
        cell_class,
        cell_slot: 0,
    })
}

fn skip_length_prefixed<R: ByteSource>(reader: &mut WireReader<R>) -> Result<(), ProtocolError> {
    let len = reader.get_u16()? as usize;
    let _ = reader.get_bytes(len)?;
    Ok(())
}

fn skip_feature_ext_ack<R: ByteSource>(reader: &mut WireReader<R>) -> Result<(), ProtocolError> {
    loop {
        let feature_id = reader.get_u8()?;
        if feature_id == 0xFF {
            return Ok(());
        }
        let len = reader.get_u32()? as usize;
        let _ = reader.get_bytes(len)?;
    }
}

/// Decode rows belonging to the currently active descriptor(s). Returns
/// one row (or compute row) per call; the caller loops until
/// [`RowOutcome::NoMoreRows`].
pub fn process_row_tokens<R: ByteSource>(
    reader: &mut WireReader<R>,
    session: &mut Session,
) -> Result<(RowOutcome, Option<crate::row::RowBuffer>), ProtocolError> {
    if session.state == SessionState::Dead {
        return Err(ProtocolError::Dead);
    }

    let marker_byte = reader.get_u8()?;
    let marker = match TokenMarker::from_u8(marker_byte) {
        Some(m) => m,
        None => return Err(ProtocolError::InvalidTokenType(marker_byte)),
    };

    match marker {
        TokenMarker::Row => {
            let info = session
                .res_info
                .as_ref()
                .ok_or(ProtocolError::InvalidTokenType(marker_byte))?;
            let mut row = info.alloc_row();
            for (idx, col) in info.columns.iter().enumerate() {
                value::decode_value(reader, col, idx, &mut row)?;
            }
            if let Some(info) = session.res_info.as_mut() {
                info.row_count += 1;
                info.rows_exist = true;
            }
            Ok((RowOutcome::RegRow, Some(row)))
        }
        TokenMarker::NbcRow => {
            let info = session
                .res_info
                .as_ref()
                .ok_or(ProtocolError::InvalidTokenType(marker_byte))?;
            let bitmap_len = crate::row::bitmap_len(info.columns.len());
            let bitmap = reader.get_bytes(bitmap_len)?;
            let mut row = info.alloc_row();
            for (idx, col) in info.columns.iter().enumerate() {
                let is_null = (bitmap[idx / 8] & (1u8 << (idx % 8))) != 0;
                if is_null {
                    row.set_null(idx, true);
                } else {
                    value::decode_value(reader, col, idx, &mut row)?;
                }
            }
            if let Some(info) = session.res_info.as_mut() {
                info.row_count += 1;
                info.rows_exist = true;
            }
            Ok((RowOutcome::RegRow, Some(row)))
        }
        TokenMarker::AltRow => {
            let computeid = reader.get_i16()?;
            let idx = session
                .comp_info
                .iter()
                .position(|c| c.computeid == computeid)
                .ok_or(ProtocolError::UnknownComputeId(computeid))?;
            let mut row = session.comp_info[idx].base.alloc_row();
            let columns = session.comp_info[idx].base.columns.clone();
            for (col_idx, col) in columns.iter().enumerate() {
                value::decode_value(reader, col, col_idx, &mut row)?;
            }
            session.comp_info[idx].base.row_count += 1;
            session.comp_info[idx].base.rows_exist = true;
            Ok((RowOutcome::CompRow(computeid), Some(row)))
        }
        TokenMarker::Done | TokenMarker::DoneProc | TokenMarker::DoneInProc => {
            reader.unget_byte(marker_byte);
            Ok((RowOutcome::NoMoreRows, None))
        }
        _ => {
            reader.unget_byte(marker_byte);
            Ok((RowOutcome::NoMoreRows, None))
        }
    }
}

/// Decode tokens belonging to the login phase of a connection: `ENVCHANGE`
/// (collation/database negotiated by the server), `LOGINACK`, informational
/// messages, and the final `DONE`. On success, applies the legacy
/// `select @@spid` fallback check via `Session::needs_spid_fallback` — the
/// caller is responsible for actually issuing that query, since this crate
/// does not send requests.
pub fn process_login_tokens<R: ByteSource>(
    reader: &mut WireReader<R>,
    session: &mut Session,
    msg_sink: &mut dyn MsgSink,
    env_sink: &mut dyn EnvSink,
) -> Result<TokenOutcome, ProtocolError> {
    loop {
        let marker_byte = reader.get_u8()?;
        let marker = match TokenMarker::from_u8(marker_byte) {
            Some(m) => m,
            None => return Err(ProtocolError::InvalidTokenType(marker_byte)),
        };
        match marker {
            TokenMarker::LoginAck => {
                let ack = message::decode_login_ack(reader)?;
                session.version = ack.tds_version;
                session.product_version = ack.prog_version;
            }
            TokenMarker::EnvChange => {
                let change = message::decode_env_change(reader)?;
                env_sink.on_env_change(&change);
            }
            TokenMarker::Error | TokenMarker::Info => {
                let is_error = marker == TokenMarker::Error;
                let msg = message::decode_msg_info(reader)?;
                let fatal = msg.is_fatal();
                if msg_sink.on_message(&msg, is_error) || fatal {
                    session.mark_dead();
                    return Err(ProtocolError::Dead);
                }
            }
            TokenMarker::FeatureExtAck => skip_feature_ext_ack(reader)?,
            TokenMarker::Sspi | TokenMarker::FedAuthInfo => skip_length_prefixed(reader)?,
            TokenMarker::Done | TokenMarker::DoneProc | TokenMarker::DoneInProc => {
                let done = decode_done(reader)?;
                session.state = if done.status.contains(DoneStatus::ERROR) {
                    SessionState::Dead
                } else {
                    SessionState::Idle
                };
                return Ok(fail_from_done(&done));
            }
            _ => return Err(ProtocolError::InvalidTokenType(marker_byte)),
        }
    }
}

/// Drain tokens until the `DONE` that acknowledges a previously sent
/// cancel (`ATTENTION`) request. Rows and descriptors encountered along
/// the way are discarded; only the attention-acknowledged completion
/// matters to the caller.
pub fn process_cancel<R: ByteSource>(
    reader: &mut WireReader<R>,
    session: &mut Session,
) -> Result<(), ProtocolError> {
    loop {
        let marker_byte = reader.get_u8()?;
        let marker = match TokenMarker::from_u8(marker_byte) {
            Some(m) => m,
            None => return Err(ProtocolError::InvalidTokenType(marker_byte)),
        };
        match marker {
            TokenMarker::Done | TokenMarker::DoneProc | TokenMarker::DoneInProc => {
                let done = decode_done(reader)?;
                if done.status.contains(DoneStatus::ATTN) {
                    session.state = SessionState::Idle;
                    return Ok(());
                }
            }
            TokenMarker::Row | TokenMarker::NbcRow | TokenMarker::AltRow => {
                reader.unget_byte(marker_byte);
                let _ = process_row_tokens(reader, session)?;
            }
            TokenMarker::ColMetaData => {
                session.reset_result_descriptors();
                let info = descriptor::decode_colmetadata(reader, session.version)?;
                session.res_info = Some(info);
            }
            TokenMarker::EnvChange => {
                let _ = message::decode_env_change(reader)?;
            }
            TokenMarker::Error | TokenMarker::Info => {
                let _ = message::decode_msg_info(reader)?;
            }
            TokenMarker::FeatureExtAck => skip_feature_ext_ack(reader)?,
            _ => skip_length_prefixed(reader).unwrap_or(()),
        }
    }
}

/// Catch-all entry point for tokens arriving outside a recognized result,
/// row, or login phase (e.g. draining an administrative command's
/// response). Forwards messages and environment changes and stops at the
/// first `DONE`-family token.
pub fn process_default_tokens<R: ByteSource>(
    reader: &mut WireReader<R>,
    session: &mut Session,
    msg_sink: &mut dyn MsgSink,
    env_sink: &mut dyn EnvSink,
) -> Result<TokenOutcome, ProtocolError> {
    loop {
        let marker_byte = reader.get_u8()?;
        let marker = match TokenMarker::from_u8(marker_byte) {
            Some(m) => m,
            None => return Err(ProtocolError::InvalidTokenType(marker_byte)),
        };
        match marker {
            TokenMarker::Error | TokenMarker::Info => {
                let is_error = marker == TokenMarker::Error;
                let msg = message::decode_msg_info(reader)?;
                let fatal = msg.is_fatal();
                if msg_sink.on_message(&msg, is_error) || fatal {
                    session.mark_dead();
                    return Err(ProtocolError::Dead);
                }
            }
            TokenMarker::EnvChange => {
                let change = message::decode_env_change(reader)?;
                env_sink.on_env_change(&change);
            }
            TokenMarker::Done | TokenMarker::DoneProc | TokenMarker::DoneInProc => {
                let done = decode_done(reader)?;
                session.state = if done.status.contains(DoneStatus::MORE) {
                    SessionState::Pending
                } else {
                    SessionState::Completed
                };
                return Ok(fail_from_done(&done));
            }
            TokenMarker::Row | TokenMarker::NbcRow | TokenMarker::AltRow => {
                reader.unget_byte(marker_byte);
                let _ = process_row_tokens(reader, session)?;
            }
            TokenMarker::ColMetaData => {
                session.reset_result_descriptors();
                session.res_info = Some(descriptor::decode_colmetadata(reader, session.version)?);
            }
            TokenMarker::FeatureExtAck => skip_feature_ext_ack(reader)?,
            _ => skip_length_prefixed(reader).unwrap_or(()),
        }
    }
}
