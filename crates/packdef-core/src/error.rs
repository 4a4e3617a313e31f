//! Error types for the packdef-core library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! variants for I/O failures, structural parse failures and schema
//! consistency violations. Lenient cases (unknown types, malformed members)
//! never reach this module; they are resolved by documented defaults.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packdef operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all packdef operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Input ended while a struct body was still open
    #[error("unterminated declaration of '{record}' starting at line {line}")]
    UnterminatedDeclaration {
        /// Name of the record being declared
        record: String,
        /// 1-based line where the declaration started
        line: usize,
    },

    /// Schema document is not valid YAML or does not match the schema shape
    #[error("failed to parse schema document: {0}")]
    SchemaParse(#[source] serde_yaml::Error),

    /// Schema document could not be serialized
    #[error("failed to emit schema document: {0}")]
    SchemaEmit(#[source] serde_yaml::Error),

    /// Schema document is well-formed YAML but semantically invalid
    #[error("invalid schema for packet '{packet}': {details}")]
    InvalidSchema {
        /// Packet identifier (may be empty when the id itself is missing)
        packet: String,
        /// Detailed description of the issue
        details: String,
    },

    /// Declared `size_check` disagrees with the end of the last field
    #[error("size check mismatch for packet '{packet}': declared {declared} bytes, fields end at {computed}")]
    SizeMismatch {
        /// Packet identifier
        packet: String,
        /// Value of `size_check` in the document
        declared: usize,
        /// End offset of the furthest field
        computed: usize,
    },

    /// Header tag cannot be rendered into a 4-byte `char` array
    #[error("invalid header tag '{tag}' for record '{record}': {details}")]
    InvalidHeaderTag {
        /// Record name
        record: String,
        /// The offending tag
        tag: String,
        /// Detailed description of the issue
        details: String,
    },

    /// Malformed `NAME=WIDTH` type-width override
    #[error("invalid type width '{spec}': expected NAME=WIDTH with a positive width")]
    InvalidTypeWidth {
        /// The override as given
        spec: String,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new unterminated declaration error
    pub fn unterminated(record: impl Into<String>, line: usize) -> Self {
        Self::UnterminatedDeclaration {
            record: record.into(),
            line,
        }
    }

    /// Creates a new invalid schema error
    pub fn invalid_schema(packet: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidSchema {
            packet: packet.into(),
            details: details.into(),
        }
    }

    /// Creates a new invalid header tag error
    pub fn invalid_header_tag(
        record: impl Into<String>,
        tag: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::InvalidHeaderTag {
            record: record.into(),
            tag: tag.into(),
            details: details.into(),
        }
    }

    /// Returns true if lenient mode may downgrade this error to a warning
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. })
    }
}
