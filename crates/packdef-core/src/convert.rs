//! File-level conversions.
//!
//! Each conversion reads one source completely, converts it in memory and
//! only then writes the destination. Output goes to a temporary file next
//! to the destination which is renamed over it on success, so a failed
//! conversion never leaves a partial file behind.

use crate::declaration::{emit_declarations, walk, DeclarationParser, StatsWriter, WriterConfig};
use crate::error::{Error, Result};
use crate::layout::{RecordLayout, TypeWidthTable};
use crate::schema::{emit_schema, SchemaParser};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

/// Direction of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Packed struct declarations to a YAML schema
    ToSchema,
    /// YAML schema to packed struct declarations
    ToDeclaration,
}

impl Direction {
    /// Short description for log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToSchema => "header -> yaml",
            Direction::ToDeclaration => "yaml -> header",
        }
    }
}

/// Configuration shared by both conversion directions
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Scalar type widths
    pub table: TypeWidthTable,
    /// Reject schemas whose `size_check` disagrees with their fields
    pub verify_size: bool,
    /// Declaration output formatting
    pub writer: WriterConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            table: TypeWidthTable::new(),
            verify_size: true,
            writer: WriterConfig::default(),
        }
    }
}

impl ConvertConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type-width table
    pub fn table(mut self, table: TypeWidthTable) -> Self {
        self.table = table;
        self
    }

    /// Sets whether size check mismatches are errors
    pub fn verify_size(mut self, verify: bool) -> Self {
        self.verify_size = verify;
        self
    }

    /// Sets the declaration output formatting
    pub fn writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }
}

/// Outcome of a conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Converted text
    pub output: String,
    /// Records that were converted
    pub records: Vec<RecordLayout>,
}

impl Conversion {
    /// Counts records, headers and fields as they are emitted
    pub fn stats(&self) -> StatsWriter {
        let mut stats = StatsWriter::default();
        if let Err(err) = walk(&self.records, &mut stats) {
            warn!("Statistics are incomplete: {}", err);
        }
        stats
    }
}

/// Converts source text in the given direction
pub fn convert_str(direction: Direction, source: &str, config: &ConvertConfig) -> Result<Conversion> {
    trace!("Converting {} bytes ({})", source.len(), direction.as_str());

    let (records, output) = match direction {
        Direction::ToSchema => {
            let records = DeclarationParser::with_table(config.table.clone()).parse(source)?;
            let output = emit_schema(&records)?;
            (records, output)
        }
        Direction::ToDeclaration => {
            let records = SchemaParser::new()
                .with_table(config.table.clone())
                .verify_size(config.verify_size)
                .parse(source)?;
            let output = emit_declarations(&records, &config.table, &config.writer)?;
            (records, output)
        }
    };

    debug!("Converted {} record(s)", records.len());
    Ok(Conversion { output, records })
}

/// Converts `input` into `output`, replacing `output` only on success
pub fn convert_file(
    direction: Direction,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConvertConfig,
) -> Result<Conversion> {
    let input = input.as_ref();
    let output = output.as_ref();

    let source = std::fs::read_to_string(input).map_err(|e| Error::file_read(input, e))?;
    let conversion = convert_str(direction, &source, config)?;
    write_atomic(output, &conversion.output)?;

    info!(
        "Wrote {} record(s) to {}",
        conversion.records.len(),
        output.display()
    );
    Ok(conversion)
}

/// Writes `contents` to a sibling temp file and renames it over `path`
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::file_write(path, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| Error::file_write(path, e))?;
    file.persist(path)
        .map_err(|e| Error::file_write(path, e.error))?;

    trace!("Persisted {} bytes to {}", contents.len(), path.display());
    Ok(())
}
