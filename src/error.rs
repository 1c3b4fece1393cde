//! Protocol-level error types.

use thiserror::Error;

/// Errors that can occur during TDS protocol parsing or encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Invalid token type value.
    #[error("invalid token type: {0:#x}")]
    InvalidTokenType(u8),

    /// Invalid data type value.
    #[error("invalid data type: {0:#x}")]
    InvalidDataType(u8),

    /// String encoding error.
    #[error("string encoding error: {0}")]
    StringEncoding(
        #[cfg(feature = "std")] String,
        #[cfg(not(feature = "std"))] &'static str,
    ),

    /// Unexpected end of stream.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Invalid field value in a protocol structure.
    #[error("invalid {field} value: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Invalid value.
        value: u32,
    },

    /// The byte source reported a transport failure; the session is dead.
    #[error("transport read failed, session is dead")]
    Dead,

    /// A column, parameter, or compute descriptor grew past what the row
    /// buffer layout can address.
    #[error("descriptor overflow: {0} columns exceeds the supported maximum")]
    DescriptorOverflow(usize),

    /// A length-prefixed column value claimed a size larger than its type
    /// allows.
    #[error("column size overflow: {column_size} exceeds max {max} for type {type_byte:#x}")]
    ColumnSizeOverflow {
        /// Size taken from the wire.
        column_size: usize,
        /// Maximum permitted by the type.
        max: usize,
        /// Raw on-wire type byte.
        type_byte: u8,
    },

    /// A NUMERIC/DECIMAL precision or magnitude-byte-count was out of range.
    #[error("numeric overflow: precision {precision} out of range")]
    NumericOverflow {
        /// The offending precision.
        precision: u8,
    },

    /// A COMPUTE row named a `computeid` with no matching `ComputeInfo`
    /// descriptor registered by an earlier token.
    #[error("unknown compute id: {0}")]
    UnknownComputeId(i16),

    /// An EED/error token referenced a server error number with no
    /// preceding message, or arrived outside of a message context.
    #[error("dangling extended error/info token")]
    DanglingEed,

    /// A dynamic (prepared statement) id was referenced before being
    /// registered with the session.
    #[error("unknown dynamic statement id: {0}")]
    UnknownDynamicId(String),
}
