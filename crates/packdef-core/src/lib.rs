//! # packdef-core
//!
//! A library for translating packed C struct declarations to and from
//! declarative YAML layout schemas.
//!
//! This crate provides the core functionality for:
//! - Parsing `struct __attribute__((packed))` declarations into record layouts
//! - Computing byte offsets and sizes from a scalar type-width table
//! - Reading and writing YAML schema documents
//! - Reconstructing declarations, including the 4-byte magic header, from a schema
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`layout`]: Record layout model, type widths and offset computation
//! - [`declaration`]: Declaration parsing and emission
//! - [`schema`]: Schema document parsing and emission
//! - [`convert`]: File-level conversions with all-or-nothing output
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use packdef_core::{emit_declarations, emit_schema, parse_declarations, parse_schema};
//! use packdef_core::{TypeWidthTable, WriterConfig};
//!
//! let source = "struct __attribute__((packed)) IMUData {
//!     char header[4] = {'I', 'M', 'U', '\\0'};
//!     float accel_x;
//! };";
//!
//! let records = parse_declarations(source)?;
//! assert_eq!(records[0].header_tag, "IMU");
//! assert_eq!(records[0].fields[0].offset, 4);
//!
//! let yaml = emit_schema(&records)?;
//! let back = parse_schema(&yaml)?;
//! let header = emit_declarations(&back, &TypeWidthTable::new(), &WriterConfig::new())?;
//! assert!(header.contains("float accel_x;"));
//! # Ok::<(), packdef_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`LayoutWriter`]: Visit records in emission order for custom output
//! - [`TypeWidthTable::with_type`]: Register widths for additional types

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod convert;
pub mod declaration;
pub mod error;
pub mod layout;
pub mod schema;

// Re-export primary types for convenience
pub use convert::{convert_file, convert_str, Conversion, ConvertConfig, Direction};
pub use declaration::{
    emit_declarations, parse_declarations, DeclarationParser, DeclarationWriter, LayoutWriter,
    StatsWriter, WriterConfig,
};
pub use error::{Error, Result};
pub use layout::{initial_offset, Field, LayoutBuilder, RecordLayout, TypeWidthTable};
pub use schema::{
    emit_schema, parse_schema, to_packet_id, to_record_name, SchemaDocument, SchemaParser,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
