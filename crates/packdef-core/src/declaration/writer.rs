//! Declaration emission.
//!
//! This module provides the [`LayoutWriter`] trait, a visitor over record
//! layouts, and [`DeclarationWriter`], which renders packed struct
//! declarations from it.

use crate::error::{Error, Result};
use crate::layout::{
    initial_offset, Field, RecordLayout, TypeWidthTable, HEADER_FIELD, HEADER_LEN,
};
use crate::schema::to_packet_id;
use tracing::{debug, warn};

/// Lines written before the first declaration
const PRELUDE: &str = "#pragma once\n#include <cstdint>\n\n";

/// Trait for visiting the parts of a record layout in emission order.
///
/// [`walk`] drives a writer through each record: `begin_record`, then
/// `write_header` if the record [`writes_header`], then `write_field` per
/// field, then `end_record`.
pub trait LayoutWriter {
    /// Start of a record
    fn begin_record(&mut self, record: &RecordLayout) -> Result<()> {
        let _ = record;
        Ok(())
    }

    /// The synthetic magic header
    fn write_header(&mut self, record: &RecordLayout) -> Result<()> {
        let _ = record;
        Ok(())
    }

    /// A field definition
    fn write_field(&mut self, record: &RecordLayout, field: &Field) -> Result<()> {
        let _ = (record, field);
        Ok(())
    }

    /// End of a record
    fn end_record(&mut self, record: &RecordLayout) -> Result<()> {
        let _ = record;
        Ok(())
    }
}

/// Returns true if a `char header[4]` member should lead the record.
///
/// The header is written when the record has a tag and its first field
/// leaves room for it. A record with no fields uses its total size instead.
pub fn writes_header(record: &RecordLayout) -> bool {
    if record.header_tag.is_empty() {
        return false;
    }
    match record.fields.iter().find(|f| f.name != HEADER_FIELD) {
        Some(first) => first.offset >= HEADER_LEN,
        None => record.total_size >= HEADER_LEN,
    }
}

/// Drives `writer` over every record in order
pub fn walk<W: LayoutWriter + ?Sized>(records: &[RecordLayout], writer: &mut W) -> Result<()> {
    for record in records {
        writer.begin_record(record)?;
        if writes_header(record) {
            writer.write_header(record)?;
        }
        for field in record.fields.iter().filter(|f| f.name != HEADER_FIELD) {
            writer.write_field(record, field)?;
        }
        writer.end_record(record)?;
    }
    Ok(())
}

/// Configuration for declaration output
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Indentation string for members (default: 4 spaces)
    pub indent_str: String,
    /// Emit `#pragma once` and `#include <cstdint>` first
    pub include_prelude: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            indent_str: "    ".to_string(),
            include_prelude: true,
        }
    }
}

impl WriterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to emit the prelude
    pub fn include_prelude(mut self, include: bool) -> Self {
        self.include_prelude = include;
        self
    }
}

/// Renders packed struct declarations
#[derive(Debug)]
pub struct DeclarationWriter<'a> {
    output: String,
    config: &'a WriterConfig,
    table: &'a TypeWidthTable,
    /// Packed offset the next field would land on
    cursor: usize,
}

impl<'a> DeclarationWriter<'a> {
    /// Creates a writer, emitting the prelude if configured
    pub fn new(table: &'a TypeWidthTable, config: &'a WriterConfig) -> Self {
        let output = if config.include_prelude {
            PRELUDE.to_string()
        } else {
            String::new()
        };

        Self {
            output,
            config,
            table,
            cursor: 0,
        }
    }

    /// Returns the rendered text
    pub fn into_string(self) -> String {
        self.output
    }

    fn write_member(&mut self, member: &str) -> Result<()> {
        self.output.push_str(&self.config.indent_str);
        self.output.push_str(member);
        self.output.push_str(";\n");
        Ok(())
    }
}

impl LayoutWriter for DeclarationWriter<'_> {
    fn begin_record(&mut self, record: &RecordLayout) -> Result<()> {
        debug!("Writing declaration {}", record.name);
        self.output
            .push_str(&format!("struct __attribute__((packed)) {}\n{{\n", record.name));
        self.cursor = initial_offset(false);
        Ok(())
    }

    fn write_header(&mut self, record: &RecordLayout) -> Result<()> {
        let literals = header_literals(record)?;
        self.cursor = initial_offset(true);
        self.write_member(&format!(
            "char {}[{}] = {{{}}}",
            HEADER_FIELD, HEADER_LEN, literals
        ))
    }

    fn write_field(&mut self, record: &RecordLayout, field: &Field) -> Result<()> {
        if field.offset != self.cursor {
            warn!(
                "{}.{} is at offset {} but would be packed at {}",
                record.name, field.name, field.offset, self.cursor
            );
        }
        self.cursor = field.end(self.table).unwrap_or(usize::MAX);

        let member = match field.array_length {
            Some(length) => format!("{} {}[{}]", field.type_name, field.name, length),
            None => format!("{} {}", field.type_name, field.name),
        };
        self.write_member(&member)
    }

    fn end_record(&mut self, record: &RecordLayout) -> Result<()> {
        if record.total_size != self.cursor {
            warn!(
                "{} declares {} bytes but its members pack into {}",
                record.name, record.total_size, self.cursor
            );
        }
        self.output.push_str("};\n\n");
        Ok(())
    }
}

/// Renders declarations for every record
pub fn emit_declarations(
    records: &[RecordLayout],
    table: &TypeWidthTable,
    config: &WriterConfig,
) -> Result<String> {
    let mut writer = DeclarationWriter::new(table, config);
    walk(records, &mut writer)?;
    Ok(writer.into_string())
}

/// Builds the `'I', 'M', 'U', '\0'` initializer list for a header tag.
///
/// Emitted schemas fill an empty tag with the packet id. When that id does
/// not fit the header, the header is written as all NULs.
fn header_literals(record: &RecordLayout) -> Result<String> {
    let mut tag = record.header_tag.as_str();
    if tag.len() > HEADER_LEN && tag == to_packet_id(&record.name) {
        warn!(
            "{}: tag '{}' is the packet id and does not fit {} bytes, writing an empty header",
            record.name, tag, HEADER_LEN
        );
        tag = "";
    }

    if !tag.is_ascii() {
        return Err(Error::invalid_header_tag(
            &record.name,
            tag,
            "tag must be ASCII",
        ));
    }
    if tag.len() > HEADER_LEN {
        return Err(Error::invalid_header_tag(
            &record.name,
            tag,
            format!("tag is longer than {} bytes", HEADER_LEN),
        ));
    }

    let literals: Vec<String> = tag
        .chars()
        .map(char_literal)
        .chain(std::iter::repeat_with(|| char_literal('\0')))
        .take(HEADER_LEN)
        .collect();
    Ok(literals.join(", "))
}

/// Renders one character as a C character literal
fn char_literal(c: char) -> String {
    match c {
        '\0' => r"'\0'".to_string(),
        '\'' => r"'\''".to_string(),
        '\\' => r"'\\'".to_string(),
        '\n' => r"'\n'".to_string(),
        '\t' => r"'\t'".to_string(),
        '\r' => r"'\r'".to_string(),
        _ if c.is_ascii_control() => format!("'\\x{:02x}'", c as u8),
        _ => format!("'{}'", c),
    }
}

/// A writer that collects statistics about the emitted records
#[derive(Debug, Default)]
pub struct StatsWriter {
    /// Number of records
    pub record_count: usize,
    /// Number of records with a synthetic header
    pub header_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of array fields
    pub array_count: usize,
}

impl LayoutWriter for StatsWriter {
    fn begin_record(&mut self, _record: &RecordLayout) -> Result<()> {
        self.record_count += 1;
        Ok(())
    }

    fn write_header(&mut self, _record: &RecordLayout) -> Result<()> {
        self.header_count += 1;
        Ok(())
    }

    fn write_field(&mut self, _record: &RecordLayout, field: &Field) -> Result<()> {
        self.field_count += 1;
        if field.is_array() {
            self.array_count += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, tag: &str, fields: Vec<Field>, total_size: usize) -> RecordLayout {
        RecordLayout {
            name: name.to_string(),
            header_tag: tag.to_string(),
            fields,
            total_size,
            ..RecordLayout::new(name)
        }
    }

    fn emit(records: &[RecordLayout]) -> String {
        emit_declarations(records, &TypeWidthTable::new(), &WriterConfig::new()).unwrap()
    }

    #[test]
    fn test_header_record() {
        let imu = record(
            "IMUData",
            "IMU",
            vec![
                Field::scalar("accel_x", "float", 4),
                Field::array("cov", "float", 3, 8),
            ],
            20,
        );

        let expected = "\
#pragma once
#include <cstdint>

struct __attribute__((packed)) IMUData
{
    char header[4] = {'I', 'M', 'U', '\\0'};
    float accel_x;
    float cov[3];
};

";
        assert_eq!(emit(&[imu]), expected);
    }

    #[test]
    fn test_no_header_when_first_offset_is_zero() {
        let gps = record(
            "GPSData",
            "GPS",
            vec![
                Field::scalar("lat", "double", 0),
                Field::scalar("lon", "double", 8),
            ],
            16,
        );

        let config = WriterConfig::new().include_prelude(false).indent_str("\t");
        let text = emit_declarations(&[gps], &TypeWidthTable::new(), &config).unwrap();
        assert_eq!(
            text,
            "struct __attribute__((packed)) GPSData\n{\n\tdouble lat;\n\tdouble lon;\n};\n\n"
        );
    }

    #[test]
    fn test_writes_header() {
        let tagged = record("A", "A", vec![Field::scalar("x", "int", 4)], 8);
        let untagged = record("B", "", vec![Field::scalar("x", "int", 4)], 8);
        let header_only = record("C", "C", vec![], 4);
        let empty = record("D", "D", vec![], 0);

        assert!(writes_header(&tagged));
        assert!(!writes_header(&untagged));
        assert!(writes_header(&header_only));
        assert!(!writes_header(&empty));
    }

    #[test]
    fn test_header_field_is_replaced_by_synthetic_header() {
        let sneaky = record(
            "SneakyData",
            "SNK",
            vec![
                Field::array("header", "char", 4, 0),
                Field::scalar("x", "int", 4),
            ],
            8,
        );
        let text = emit(&[sneaky]);
        assert!(text.contains(r"char header[4] = {'S', 'N', 'K', '\0'};"));
        assert_eq!(text.matches("header").count(), 1);
    }

    #[test]
    fn test_full_width_and_escaped_tags() {
        let full = record("A", "ABCD", vec![Field::scalar("x", "int", 4)], 8);
        assert!(emit(&[full]).contains("{'A', 'B', 'C', 'D'}"));

        let quoted = record("Q", "a'b", vec![Field::scalar("x", "int", 4)], 8);
        assert!(emit(&[quoted]).contains(r"{'a', '\'', 'b', '\0'}"));
    }

    #[test]
    fn test_invalid_header_tags() {
        let table = TypeWidthTable::new();
        let config = WriterConfig::new();

        let long = record("L", "TOOLONG", vec![Field::scalar("x", "int", 4)], 8);
        let err = emit_declarations(&[long], &table, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderTag { .. }));

        let unicode = record("U", "µT", vec![Field::scalar("x", "int", 4)], 8);
        assert!(emit_declarations(&[unicode], &table, &config).is_err());
    }

    #[test]
    fn test_oversized_id_tag_writes_empty_header() {
        let telemetry = record(
            "TelemetryData",
            "Telemetry",
            vec![Field::scalar("time", "double", 4)],
            12,
        );
        let text = emit(&[telemetry]);
        assert!(text.contains(r"char header[4] = {'\0', '\0', '\0', '\0'};"));
        assert!(text.contains("    double time;\n"));

        // A short id still fits and is written as the tag
        let gps = record("GPSData", "GPS", vec![Field::scalar("t", "double", 4)], 12);
        assert!(emit(&[gps]).contains(r"{'G', 'P', 'S', '\0'}"));
    }

    #[test]
    fn test_overflowing_field_end_saturates() {
        let far = record(
            "FarData",
            "",
            vec![
                Field::scalar("a", "uint8_t", usize::MAX),
                Field::scalar("b", "uint8_t", usize::MAX),
            ],
            8,
        );
        let text = emit(&[far]);
        assert!(text.contains("    uint8_t a;\n    uint8_t b;\n"));
    }

    #[test]
    fn test_stats_writer() {
        let records = vec![
            record(
                "IMUData",
                "IMU",
                vec![
                    Field::scalar("time", "double", 4),
                    Field::array("cov", "float", 9, 12),
                ],
                48,
            ),
            record("GPSData", "", vec![Field::scalar("lat", "double", 0)], 8),
        ];

        let mut stats = StatsWriter::default();
        walk(&records, &mut stats).unwrap();

        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.header_count, 1);
        assert_eq!(stats.field_count, 3);
        assert_eq!(stats.array_count, 1);
    }
}
