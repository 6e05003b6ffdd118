// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use crate::Time;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    /// Malformed codec bytes or a stream that ends mid-value.
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        expected: u64,
        found: u64,
    },
    /// Seeking a stateful trace before its minimum time.
    #[error("Time {requested} is out of range [{min}, {max}]")]
    OutOfRange {
        requested: Time,
        min: Time,
        max: Time,
    },
    #[error("Reader is not positioned: call seek() first")]
    NotPositioned,
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Missing property: {0}")]
    MissingProperty(String),
    #[error("Invalid value for property {key}: {value}")]
    InvalidProperty {
        key: String,
        value: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Property block error: {0}")]
    Properties(#[from] serde_json::Error),
}

impl TraceError {
    /// Maps an I/O error raised while decoding a value. A short read inside
    /// a value means the stream is truncated, anything else is a real I/O
    /// failure.
    pub(crate) fn from_decode(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TraceError::CorruptStream("stream ended mid-value".to_string())
        } else {
            TraceError::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
