//! # tds-tokens
//!
//! Token-stream processing for the MS-TDS / Sybase TDS wire protocol:
//! result and parameter descriptors, row decoding, server messages,
//! environment changes, and the connection-scoped session state machine
//! that ties them together.
//!
//! This crate does not open sockets, negotiate pre-login/encryption, or
//! frame packets — it starts from an already-depacketized byte stream (see
//! [`reader::ByteSource`]) and ends at decoded rows and session state. A
//! driver crate above this one owns the transport, login handshake, and
//! request encoding.
//!
//! ## Features
//!
//! - `std` (default): enable standard library support.
//! - `alloc`: allocation without full `std`.
//! - `encoding` (default): collation-aware narrowing of non-Unicode
//!   character columns via `encoding_rs`; without it, non-Unicode bytes
//!   are decoded as Latin-1.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_tokens::{dispatcher, session::Session, version::TdsVersion};
//!
//! let mut session = Session::new(TdsVersion::V7_4);
//! loop {
//!     match dispatcher::process_result_tokens(&mut reader, &mut session, &mut msgs, &mut env)? {
//!         dispatcher::TokenOutcome::RowFmtResult => { /* switch to process_row_tokens */ }
//!         dispatcher::TokenOutcome::NoMoreResults => break,
//!         _ => {}
//!     }
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod collation;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod prelude;
pub mod reader;
pub mod row;
pub mod session;
pub mod types;
pub mod value;
pub mod version;

pub use descriptor::{
    CellClass, Collation, ColumnDescFlags, ColumnInfo, ComputeInfo, Dynamic, ParamInfo, ResultInfo,
};
pub use dispatcher::{
    process_cancel, process_default_tokens, process_login_tokens, process_result_tokens,
    process_row_tokens, Done, DoneStatus, RowOutcome, TokenMarker, TokenOutcome,
};
pub use error::ProtocolError;
pub use message::{AuthResponder, EnvChangeRecord, EnvChangeType, EnvSink, LoginAck, MsgInfo, MsgSink};
pub use reader::{ByteSource, WireReader};
pub use row::{BlobCell, NumericCell, RowBuffer};
pub use session::{CurrResInfo, Session, SessionState};
pub use types::{ConversionType, TypeId};
pub use version::TdsVersion;
