//! The error taxonomy for the whole engine.
//!
//! Kinds are grouped the way the specification groups them (structural,
//! syntax, decoding, encryption, content, flow); `thiserror` generates the
//! `Display` and `std::error::Error` impls. `ContentStreamError` is the one
//! variant that is *constructed* without aborting the enclosing call — the
//! page-extraction loop in `orchestrator` catches it at the page boundary.

use std::fmt;

use crate::value::ObjectPtr;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Structural ---
    #[error("not a PDF file (missing %PDF- header)")]
    NotAPdf,
    #[error("unsupported PDF version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("cross-reference table is invalid: {0}")]
    BadXref(String),
    #[error("object {0} {1} is missing from the cross-reference table")]
    MissingObject(u32, u16),
    #[error("trailer dictionary is invalid: {0}")]
    BadTrailer(String),

    // --- Syntax ---
    #[error("unexpected token at offset {offset}: {detail}")]
    UnexpectedToken { offset: usize, detail: String },
    #[error("hex string exceeds the {limit}-byte limit")]
    HexStringTooLarge { limit: usize },
    #[error("literal string starting at offset {0} was never closed")]
    UnterminatedString(usize),
    #[error("stream /Length is invalid or does not resolve: {0}")]
    BadStreamLength(String),

    // --- Decoding ---
    #[error("unsupported stream filter {0:?}")]
    UnsupportedFilter(String),
    #[error("filter {name:?} failed to decode: {detail}")]
    FilterError { name: String, detail: String },
    #[error("decoded stream exceeds the {limit}-byte limit")]
    StreamTooLarge { limit: usize },
    #[error("PKCS#7 padding is invalid")]
    InvalidPadding,

    // --- Encryption ---
    #[error("encryption version {v} revision {r} is not supported")]
    EncryptionUnsupported { v: u8, r: u8 },
    #[error("the supplied password does not open this document")]
    BadPassword,
    #[error("permissions entry did not validate against /P")]
    PermissionsFailed,

    // --- Content ---
    #[error("content stream error on page {page}: {detail}")]
    ContentStreamError { page: usize, detail: String },

    // --- Flow ---
    #[error("operation was cancelled")]
    Cancelled,
    #[error("operation exceeded its deadline")]
    Timeout,

    // --- I/O escape hatch, matching the teacher's pattern of one `From` impl per
    // wrapped external error type ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn missing(ptr: ObjectPtr) -> Self {
        Error::MissingObject(ptr.num, ptr.gen)
    }

    pub fn unexpected(offset: usize, detail: impl Into<String>) -> Self {
        Error::UnexpectedToken {
            offset,
            detail: detail.into(),
        }
    }

    pub fn filter(name: impl Into<String>, detail: impl fmt::Display) -> Self {
        Error::FilterError {
            name: name.into(),
            detail: detail.to_string(),
        }
    }

    /// True for the errors that the orchestrator must catch at a page
    /// boundary instead of propagating (spec: "L5 errors are caught at the
    /// page boundary and returned as part of that page's result").
    pub fn is_page_local(&self) -> bool {
        matches!(self, Error::ContentStreamError { .. })
    }
}
