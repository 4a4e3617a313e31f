//! YAML schema documents.
//!
//! A schema document describes packet layouts declaratively:
//!
//! ```yaml
//! packets:
//! - id: IMU
//!   header_string: IMU
//!   size_check: 16
//!   time_field: time
//!   fields:
//!   - name: accel_x
//!     type: float
//!     offset: 4
//!   - name: cov
//!     type: float
//!     offset: 8
//!     count: 2
//! ```
//!
//! Offsets in a document are authoritative. The [`SchemaParser`] never
//! recomputes them; it only sorts fields by offset and checks that
//! `size_check` agrees with where the furthest field ends.
//!
//! Packet ids and record names are related by the `Data` suffix convention
//! implemented in [`to_packet_id`] and [`to_record_name`]. The mapping is
//! lossy: a record named `IMU` and one named `IMUData` share the id `IMU`,
//! and the id always maps back to `IMUData`.

mod model;

use crate::error::{Error, Result};
use crate::layout::{Field, RecordLayout, TypeWidthTable, HEADER_FIELD};
use tracing::{debug, warn};

pub use model::{FieldDescriptor, PacketDescriptor, SchemaDocument};

/// Suffix stripped from record names to form packet ids
pub const RECORD_SUFFIX: &str = "Data";

/// Maps a record name to its packet id by dropping a trailing `Data`.
///
/// A name that is exactly `Data` is kept whole so the id is never empty.
pub fn to_packet_id(record_name: &str) -> &str {
    match record_name.strip_suffix(RECORD_SUFFIX) {
        Some(id) if !id.is_empty() => id,
        _ => record_name,
    }
}

/// Maps a packet id to its record name by appending `Data`
pub fn to_record_name(packet_id: &str) -> String {
    format!("{}{}", packet_id, RECORD_SUFFIX)
}

impl SchemaDocument {
    /// Builds a document describing `records`
    pub fn from_layouts(records: &[RecordLayout]) -> Self {
        Self {
            packets: records.iter().map(PacketDescriptor::from_layout).collect(),
        }
    }
}

impl PacketDescriptor {
    /// Describes one record; the header string defaults to the packet id
    pub fn from_layout(record: &RecordLayout) -> Self {
        let id = to_packet_id(&record.name).to_string();
        let header_string = if record.header_tag.is_empty() {
            id.clone()
        } else {
            record.header_tag.clone()
        };

        Self {
            id,
            header_string: Some(header_string),
            size_check: record.total_size,
            time_field: record.time_field.clone(),
            fields: record
                .fields
                .iter()
                .filter(|f| f.name != HEADER_FIELD)
                .map(|f| FieldDescriptor {
                    name: f.name.clone(),
                    type_name: f.type_name.clone(),
                    offset: f.offset,
                    count: f.array_length,
                })
                .collect(),
        }
    }
}

/// Renders a schema document for `records`
pub fn emit_schema(records: &[RecordLayout]) -> Result<String> {
    let document = SchemaDocument::from_layouts(records);
    debug!("Emitting schema with {} packet(s)", document.packets.len());
    serde_yaml::to_string(&document).map_err(Error::SchemaEmit)
}

/// Parser for schema documents
#[derive(Debug, Clone)]
pub struct SchemaParser {
    table: TypeWidthTable,
    verify_size: bool,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaParser {
    /// Creates a parser with the builtin type widths and strict size checks
    pub fn new() -> Self {
        Self {
            table: TypeWidthTable::new(),
            verify_size: true,
        }
    }

    /// Sets the type-width table used for size checks
    pub fn with_table(mut self, table: TypeWidthTable) -> Self {
        self.table = table;
        self
    }

    /// Sets whether a `size_check` mismatch is an error (default) or a warning
    pub fn verify_size(mut self, verify: bool) -> Self {
        self.verify_size = verify;
        self
    }

    /// Parses a YAML schema document into record layouts, in document order
    pub fn parse(&self, source: &str) -> Result<Vec<RecordLayout>> {
        if source.trim().is_empty() {
            return Ok(Vec::new());
        }
        let document: SchemaDocument = serde_yaml::from_str(source).map_err(Error::SchemaParse)?;
        self.from_document(&document)
    }

    /// Converts an already deserialized document
    pub fn from_document(&self, document: &SchemaDocument) -> Result<Vec<RecordLayout>> {
        document
            .packets
            .iter()
            .map(|packet| self.packet_layout(packet))
            .collect()
    }

    fn packet_layout(&self, packet: &PacketDescriptor) -> Result<RecordLayout> {
        if packet.id.trim().is_empty() {
            return Err(Error::invalid_schema("", "packet id is empty"));
        }

        let mut fields = Vec::with_capacity(packet.fields.len());
        for descriptor in &packet.fields {
            if descriptor.name.trim().is_empty() {
                return Err(Error::invalid_schema(
                    &packet.id,
                    format!("field at offset {} has no name", descriptor.offset),
                ));
            }
            if descriptor.name == HEADER_FIELD {
                debug!("{}: dropping explicit header field", packet.id);
                continue;
            }
            fields.push(Field {
                name: descriptor.name.clone(),
                type_name: descriptor.type_name.clone(),
                array_length: descriptor.count,
                offset: descriptor.offset,
            });
        }

        // Stable: equal offsets keep document order
        fields.sort_by_key(|f| f.offset);

        let layout = RecordLayout {
            name: to_record_name(&packet.id),
            header_tag: packet.header_string.clone().unwrap_or_default(),
            time_field: packet.time_field.clone(),
            fields,
            total_size: packet.size_check,
        };

        if let Err(err) = self.check_size(&packet.id, &layout) {
            if self.verify_size || !err.is_recoverable() {
                return Err(err);
            }
            warn!("{}", err);
        }

        debug!(
            "Parsed packet {} as {} ({} fields, {} bytes)",
            packet.id,
            layout.name,
            layout.fields.len(),
            layout.total_size
        );
        Ok(layout)
    }

    /// Checks that every field end fits in a `usize` and that the furthest
    /// one agrees with `size_check`
    fn check_size(&self, packet: &str, layout: &RecordLayout) -> Result<()> {
        let mut computed: Option<usize> = None;
        for field in &layout.fields {
            let end = field.end(&self.table).ok_or_else(|| {
                Error::invalid_schema(
                    packet,
                    format!(
                        "field '{}' at offset {} overflows the addressable size",
                        field.name, field.offset
                    ),
                )
            })?;
            computed = computed.max(Some(end));
        }

        match computed {
            Some(computed) if computed != layout.total_size => Err(Error::SizeMismatch {
                packet: packet.to_string(),
                declared: layout.total_size,
                computed,
            }),
            _ => Ok(()),
        }
    }
}

/// Parses a schema document with builtin widths and strict size checks
pub fn parse_schema(source: &str) -> Result<Vec<RecordLayout>> {
    SchemaParser::new().parse(source)
}
