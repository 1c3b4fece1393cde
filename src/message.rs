//! Server-reported messages (`ERROR`/`INFO`/`EED`), environment-change
//! notifications, login acknowledgement, and the authentication-challenge
//! shim.
//!
//! None of the collaborator traits here are implemented by this crate —
//! `MsgSink`, `EnvSink`, and `AuthResponder` are contracts a driver layer
//! above this one fulfills. This module only decodes the wire tokens and
//! hands the results to those contracts.

use crate::error::ProtocolError;
use crate::prelude::*;
use crate::reader::{ByteSource, WireReader};
use crate::version::TdsVersion;

/// A decoded `ERROR`, `INFO`, or legacy `EED` token.
#[derive(Debug, Clone)]
pub struct MsgInfo {
    /// Server-assigned message number.
    pub number: i32,
    /// Error state (used to distinguish multiple raises of the same
    /// number).
    pub state: u8,
    /// Severity class. 0-9 informational, 10 warning, 11-16 application
    /// error, 17-19 resource/internal error, 20-24 fatal.
    pub class: u8,
    /// Human-readable message text.
    pub message: String,
    /// Name of the server that raised the message.
    pub server: String,
    /// Stored procedure name, empty if raised outside one.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl MsgInfo {
    /// `class >= 20`: the connection is no longer usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class >= 20
    }

    /// `class >= 16`: the current batch is aborted (but the connection
    /// survives).
    #[must_use]
    pub fn is_batch_abort(&self) -> bool {
        self.class >= 16
    }
}

/// Environment variables a server can change mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvChangeType {
    /// Default database changed.
    Database = 1,
    /// Character set/collation changed.
    Language = 2,
    /// Character set changed (legacy, pre-collation).
    CharacterSet = 3,
    /// Network packet size changed.
    PacketSize = 4,
    /// A local transaction began; carries the new transaction descriptor.
    BeginTransaction = 8,
    /// A transaction committed.
    CommitTransaction = 9,
    /// A transaction rolled back.
    RollbackTransaction = 10,
    /// Server redirected the client to a different endpoint.
    Routing = 20,
}

impl EnvChangeType {
    /// Map a raw on-wire type byte to an `EnvChangeType`, if known.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Database),
            2 => Some(Self::Language),
            3 => Some(Self::CharacterSet),
            4 => Some(Self::PacketSize),
            8 => Some(Self::BeginTransaction),
            9 => Some(Self::CommitTransaction),
            10 => Some(Self::RollbackTransaction),
            20 => Some(Self::Routing),
            _ => None,
        }
    }
}

/// One decoded `ENVCHANGE` sub-record.
#[derive(Debug, Clone)]
pub struct EnvChangeRecord {
    /// Which environment variable changed.
    pub change_type: EnvChangeType,
    /// New value (string form for DB/language/charset/packet size,
    /// `routing://host:port` for `Routing`, empty for transaction markers).
    pub new_value: String,
    /// Previous value, empty if not applicable.
    pub old_value: String,
    /// Raw transaction descriptor bytes, populated only for
    /// `BeginTransaction`/`CommitTransaction`/`RollbackTransaction`.
    pub transaction_descriptor: Option<[u8; 8]>,
}

/// Server login acknowledgement.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface type (0 = SQL, 1 = RPC).
    pub interface: u8,
    /// Negotiated TDS version.
    pub tds_version: TdsVersion,
    /// Server program name (e.g. "Microsoft SQL Server").
    pub prog_name: String,
    /// Server program version, packed as 4 bytes.
    pub prog_version: u32,
}

/// Callback for server-reported messages. Returning `true` marks the
/// session dead (mirrors the original's non-zero-return convention).
pub trait MsgSink {
    /// Called for every decoded `ERROR`/`INFO`/`EED` token.
    fn on_message(&mut self, msg: &MsgInfo, is_error: bool) -> bool;
}

/// Callback for `ENVCHANGE` tokens.
pub trait EnvSink {
    /// Called for every decoded environment-change record.
    fn on_env_change(&mut self, change: &EnvChangeRecord);
}

/// Callback that answers a server authentication challenge (SSPI/NTLM
/// nonce, federated-auth redirect). This crate only decodes the challenge;
/// producing a response requires a crypto/identity layer out of scope here.
pub trait AuthResponder {
    /// Called with the raw challenge bytes from an `SSPI` token.
    fn respond(&mut self, nonce: &[u8]) -> Result<(), ProtocolError>;
}

/// Decode an `ERROR`/`INFO` token body (identical layout; only the marker
/// byte that led here distinguishes them).
pub fn decode_msg_info<R: ByteSource>(reader: &mut WireReader<R>) -> Result<MsgInfo, ProtocolError> {
    let _length = reader.get_u16()?;
    let number = reader.get_i32()?;
    let state = reader.get_u8()?;
    let class = reader.get_u8()?;
    let message = reader.get_us_varchar(true, 0)?;
    let server = reader.get_b_varchar(true, 0)?;
    let procedure = reader.get_b_varchar(true, 0)?;
    let line = reader.get_i32()?;
    Ok(MsgInfo {
        number,
        state,
        class,
        message,
        server,
        procedure,
        line,
    })
}

fn decode_transaction_descriptor<R: ByteSource>(
    reader: &mut WireReader<R>,
) -> Result<[u8; 8], ProtocolError> {
    let len = reader.get_u8()?;
    let mut buf = [0u8; 8];
    let bytes = reader.get_bytes(len as usize)?;
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    Ok(buf)
}

/// Decode a routing `ENVCHANGE` value: protocol byte, port, then a
/// length-prefixed UTF-16LE hostname, formatted as `host:port`.
fn decode_routing_value<R: ByteSource>(reader: &mut WireReader<R>) -> Result<String, ProtocolError> {
    let _protocol = reader.get_u8()?;
    let port = reader.get_u16()?;
    let host_len = reader.get_u16()? as usize;
    let host = reader.get_char_data(host_len, true, 0)?;
    Ok(format!("{host}:{port}"))
}

/// Decode one `ENVCHANGE` token body. The token's total byte length
/// precedes the sub-records but each sub-record is self-delimiting, so it
/// is consumed here rather than tracked by the caller.
pub fn decode_env_change<R: ByteSource>(
    reader: &mut WireReader<R>,
) -> Result<EnvChangeRecord, ProtocolError> {
    let _length = reader.get_u16()?;
    let raw_type = reader.get_u8()?;
    let change_type =
        EnvChangeType::from_u8(raw_type).ok_or(ProtocolError::InvalidField {
            field: "env_change_type",
            value: raw_type as u32,
        })?;

    match change_type {
        EnvChangeType::Routing => {
            let total_len = reader.get_u16()?;
            let _ = total_len;
            let new_value = decode_routing_value(reader)?;
            let _old_len = reader.get_u16()?;
            Ok(EnvChangeRecord {
                change_type,
                new_value,
                old_value: String::new(),
                transaction_descriptor: None,
            })
        }
        EnvChangeType::BeginTransaction
        | EnvChangeType::CommitTransaction
        | EnvChangeType::RollbackTransaction => {
            let descriptor = decode_transaction_descriptor(reader)?;
            let _old_len = reader.get_u8()?;
            Ok(EnvChangeRecord {
                change_type,
                new_value: String::new(),
                old_value: String::new(),
                transaction_descriptor: Some(descriptor),
            })
        }
        _ => {
            let new_value = reader.get_b_varchar(true, 0)?;
            let old_value = reader.get_b_varchar(true, 0)?;
            Ok(EnvChangeRecord {
                change_type,
                new_value,
                old_value,
                transaction_descriptor: None,
            })
        }
    }
}

/// Decode a `LOGINACK` token body.
pub fn decode_login_ack<R: ByteSource>(reader: &mut WireReader<R>) -> Result<LoginAck, ProtocolError> {
    let _length = reader.get_u16()?;
    let interface = reader.get_u8()?;
    let tds_version = TdsVersion::new(reader.get_u32()?);
    let prog_name = reader.get_b_varchar(true, 0)?;
    let prog_version = reader.get_u32()?;
    Ok(LoginAck {
        interface,
        tds_version,
        prog_name,
        prog_version,
    })
}
