//! Packed struct declaration parsing.
//!
//! This module reads C/C++ headers containing packed record declarations of
//! the form
//!
//! ```text
//! struct __attribute__((packed)) IMUData
//! {
//!     char header[4] = {'I', 'M', 'U', '\0'};
//!     float accel_x;
//!     float cov[9];
//! };
//! ```
//!
//! and turns each one into a [`RecordLayout`].
//!
//! ## Algorithm Overview
//!
//! 1. Strip `//` comments and skip blank lines
//! 2. Outside a declaration, look for the record-start pattern
//! 3. Inside, accumulate text while tracking brace depth until the body
//!    closes with `};`
//! 4. Split the body on `;` and classify each statement as the header
//!    member, a field, or noise to skip
//! 5. Lay out the fields with a [`LayoutBuilder`] seeded past the header
//!
//! Comment stripping does not look inside string or character literals,
//! so a `//` inside a literal truncates the line.
//!
//! Anything outside the narrow grammar degrades instead of failing: unknown
//! types get [`FALLBACK_WIDTH`](crate::layout::FALLBACK_WIDTH) and
//! statements that are not `<type> <name>` are skipped. The one fatal
//! condition is input ending inside a declaration body.

mod writer;

use crate::error::{Error, Result};
use crate::layout::{LayoutBuilder, RecordLayout, TypeWidthTable, HEADER_FIELD, HEADER_LEN};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

pub use writer::{
    emit_declarations, walk, writes_header, DeclarationWriter, LayoutWriter, StatsWriter,
    WriterConfig,
};

/// `struct __attribute__((packed)) Name`, capturing the name
static RECORD_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"struct\s+__attribute__\s*\(\(\s*(?:packed|__packed__)\s*\)\)\s+(\w+)")
        .expect("record start pattern is valid")
});

/// A single-quoted character literal, capturing its contents
static CHAR_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(\\x[0-9A-Fa-f]{1,2}|\\[0-7]{1,3}|\\.|[^'\\])'")
        .expect("char literal pattern is valid")
});

/// `name[N]`, capturing the name and the decimal length
static ARRAY_DECLARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)\[(\d+)\]$").expect("array declarator pattern is valid")
});

/// Whitespace around array brackets, so `cov [ 9 ]` tokenizes as `cov[9]`
static BRACKET_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([\[\]])\s*").expect("bracket spacing pattern is valid"));

/// A classified body statement
#[derive(Debug, Clone, PartialEq, Eq)]
enum Member {
    /// The `header` magic member with its decoded tag and element count
    Header { tag: String, length: usize },
    /// A regular field
    Field {
        name: String,
        type_name: String,
        array_length: Option<usize>,
    },
}

/// A declaration whose body is still being accumulated
#[derive(Debug)]
struct PendingRecord {
    name: String,
    start_line: usize,
    text: String,
    depth: isize,
    seen_open: bool,
}

impl PendingRecord {
    fn new(name: &str, start_line: usize) -> Self {
        Self {
            name: name.to_string(),
            start_line,
            text: String::new(),
            depth: 0,
            seen_open: false,
        }
    }

    fn feed(&mut self, line: &str) {
        for c in line.chars() {
            match c {
                '{' => {
                    self.depth += 1;
                    self.seen_open = true;
                }
                '}' => self.depth -= 1,
                _ => {}
            }
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// A start line ending in `;` before any brace declares nothing
    fn is_forward_declaration(&self) -> bool {
        !self.seen_open && self.text.trim_end().ends_with(';')
    }

    fn is_closed(&self) -> bool {
        if !self.seen_open || self.depth > 0 {
            return false;
        }
        self.text
            .trim_end()
            .strip_suffix(';')
            .is_some_and(|rest| rest.trim_end().ends_with('}'))
    }

    /// Text strictly between the first `{` and the last `}`
    fn body(&self) -> &str {
        match (self.text.find('{'), self.text.rfind('}')) {
            (Some(start), Some(end)) if start < end => &self.text[start + 1..end],
            _ => "",
        }
    }
}

/// Parser for packed struct declarations
#[derive(Debug, Clone, Default)]
pub struct DeclarationParser {
    table: TypeWidthTable,
}

impl DeclarationParser {
    /// Creates a parser with the builtin type widths
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with a custom type-width table
    pub fn with_table(table: TypeWidthTable) -> Self {
        Self { table }
    }

    /// Returns the type-width table used for layout
    pub fn table(&self) -> &TypeWidthTable {
        &self.table
    }

    /// Parses every packed declaration in `source`, in source order.
    ///
    /// Fails without returning any record if the input ends inside a
    /// declaration body.
    pub fn parse(&self, source: &str) -> Result<Vec<RecordLayout>> {
        let mut records = Vec::new();
        let mut pending: Option<PendingRecord> = None;

        for (index, raw) in source.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if pending.is_none() {
                if let Some(caps) = RECORD_START.captures(line) {
                    trace!("Record '{}' starts at line {}", &caps[1], index + 1);
                    pending = Some(PendingRecord::new(&caps[1], index + 1));
                }
            }

            let Some(record) = pending.as_mut() else {
                continue;
            };

            record.feed(line);

            if record.is_forward_declaration() {
                debug!("Ignoring forward declaration of '{}'", record.name);
                pending = None;
            } else if record.is_closed() {
                if let Some(record) = pending.take() {
                    records.push(self.finish_record(&record));
                }
            }
        }

        if let Some(record) = pending {
            return Err(Error::unterminated(record.name, record.start_line));
        }

        debug!("Parsed {} record(s)", records.len());
        Ok(records)
    }

    fn finish_record(&self, record: &PendingRecord) -> RecordLayout {
        let members: Vec<Member> = record
            .body()
            .split(';')
            .map(str::trim)
            .filter(|stmt| !stmt.is_empty())
            .filter_map(|stmt| classify(&record.name, stmt))
            .collect();

        let mut header: Option<&str> = None;
        for (position, member) in members.iter().enumerate() {
            if let Member::Header { tag, length } = member {
                if header.is_some() {
                    warn!("{}: ignoring repeated header member", record.name);
                    continue;
                }
                if *length != HEADER_LEN {
                    warn!(
                        "{}: header has {} element(s), offsets assume {}",
                        record.name, length, HEADER_LEN
                    );
                }
                if position != 0 {
                    warn!(
                        "{}: header is not the first member, offsets assume it leads the record",
                        record.name
                    );
                }
                header = Some(tag.as_str());
            }
        }

        let tag = header.unwrap_or("");
        let mut builder =
            LayoutBuilder::new(&self.table, record.name.as_str(), header.is_some()).header_tag(tag);

        for member in &members {
            if let Member::Field {
                name,
                type_name,
                array_length,
            } = member
            {
                builder.push(name.as_str(), type_name.as_str(), *array_length);
            }
        }

        let layout = builder.finish();
        debug!(
            "Parsed {} ({} fields, {} bytes, header '{}')",
            layout.name,
            layout.fields.len(),
            layout.total_size,
            layout.header_tag
        );
        layout
    }
}

/// Parses declarations with the builtin type widths
pub fn parse_declarations(source: &str) -> Result<Vec<RecordLayout>> {
    DeclarationParser::new().parse(source)
}

/// Drops everything from the first `//`
fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or("")
}

/// Classifies one body statement, returning `None` for statements to skip
fn classify(record: &str, stmt: &str) -> Option<Member> {
    let (declarator, initializer) = match stmt.split_once('=') {
        Some((declarator, initializer)) => (declarator, Some(initializer)),
        None => (stmt, None),
    };

    let declarator = BRACKET_SPACING.replace_all(declarator, "$1");
    let tokens: Vec<&str> = declarator.split_whitespace().collect();
    let Some((name_token, type_tokens)) = tokens.split_last() else {
        return None;
    };
    if type_tokens.is_empty() {
        trace!("{}: skipping statement '{}'", record, stmt);
        return None;
    }

    let (name, array_length) = if name_token.contains('[') {
        match ARRAY_DECLARATOR.captures(name_token) {
            Some(caps) => match caps[2].parse::<usize>() {
                Ok(length) => (caps[1].to_string(), Some(length)),
                Err(_) => {
                    warn!("{}: array length out of range in '{}'", record, stmt);
                    return None;
                }
            },
            None => {
                warn!("{}: skipping unsupported declarator '{}'", record, name_token);
                return None;
            }
        }
    } else {
        (name_token.to_string(), None)
    };

    // Any member named `header` is the magic tag, whatever its shape
    if name == HEADER_FIELD {
        if array_length.is_none() {
            warn!("{}: scalar header member '{}'", record, stmt);
        }
        let tag = initializer.map(decode_header_tag).unwrap_or_default();
        return Some(Member::Header {
            tag,
            length: array_length.unwrap_or(1),
        });
    }

    Some(Member::Field {
        name,
        type_name: type_tokens.join(" "),
        array_length,
    })
}

/// Concatenates the character literals of an initializer, dropping trailing NULs
fn decode_header_tag(initializer: &str) -> String {
    let tag: String = CHAR_LITERAL
        .captures_iter(initializer)
        .filter_map(|caps| decode_char_literal(&caps[1]))
        .collect();
    tag.trim_end_matches('\0').to_string()
}

/// Decodes the contents of a character literal, handling C escapes
fn decode_char_literal(body: &str) -> Option<char> {
    let Some(escape) = body.strip_prefix('\\') else {
        return body.chars().next();
    };

    if let Some(hex) = escape.strip_prefix('x') {
        return u8::from_str_radix(hex, 16).ok().map(char::from);
    }
    if escape.chars().all(|c| c.is_digit(8)) {
        return u8::from_str_radix(escape, 8).ok().map(char::from);
    }

    match escape {
        "n" => Some('\n'),
        "t" => Some('\t'),
        "r" => Some('\r'),
        other => other.chars().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Field;
    use pretty_assertions::assert_eq;

    const IMU: &str = "struct __attribute__((packed)) IMUData { char header[4] = {'I','M','U','\\0'}; float accel_x; float accel_y; uint32_t timestamp; };";

    #[test]
    fn test_single_line_declaration() {
        let records = parse_declarations(IMU).unwrap();
        assert_eq!(records.len(), 1);

        let imu = &records[0];
        assert_eq!(imu.name, "IMUData");
        assert_eq!(imu.header_tag, "IMU");
        assert_eq!(
            imu.fields,
            vec![
                Field::scalar("accel_x", "float", 4),
                Field::scalar("accel_y", "float", 8),
                Field::scalar("timestamp", "uint32_t", 12),
            ]
        );
        assert_eq!(imu.total_size, 16);
    }

    #[test]
    fn test_multi_line_with_comments_and_arrays() {
        let source = r"#pragma once
#include <cstdint>

// Inertial packet
struct __attribute__((packed)) IMUData
{
    char header[4] = {'I', 'M', 'U', '\0'};
    double time;
    // Covariance (9 elements)
    float accelCov[9];
    unsigned short flags; // bitmask
    uint8_t padding;
};
";
        let records = parse_declarations(source).unwrap();
        assert_eq!(records.len(), 1);

        let imu = &records[0];
        assert_eq!(imu.header_tag, "IMU");
        assert_eq!(
            imu.fields,
            vec![
                Field::scalar("time", "double", 4),
                Field::array("accelCov", "float", 9, 12),
                Field::scalar("flags", "unsigned short", 48),
                Field::scalar("padding", "uint8_t", 50),
            ]
        );
        assert_eq!(imu.total_size, 51);
    }

    #[test]
    fn test_multiple_records_in_order() {
        let source = r"
struct __attribute__((packed)) GPSData {
    double lat;
    double lon;
};

struct Plain { int ignored; };

struct __attribute__((packed)) BatteryData
{
    char header[4] = {'B', 'A', 'T', '\0'};
    float voltage;
};
";
        let records = parse_declarations(source).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["GPSData", "BatteryData"]);

        assert_eq!(records[0].header_tag, "");
        assert_eq!(records[0].first_offset(), 0);
        assert_eq!(records[0].total_size, 16);

        assert_eq!(records[1].header_tag, "BAT");
        assert_eq!(records[1].first_offset(), 4);
        assert_eq!(records[1].total_size, 8);
    }

    #[test]
    fn test_unterminated_declaration() {
        let source = "struct __attribute__((packed)) Broken {\n    float x;\n";
        let err = parse_declarations(source).unwrap_err();
        assert!(matches!(
            err,
            Error::UnterminatedDeclaration { ref record, line: 1 } if record == "Broken"
        ));
    }

    #[test]
    fn test_unterminated_after_complete_record() {
        let source = format!("{}\nstruct __attribute__((packed)) Next {{\n    int a;\n}}\n", IMU);
        assert!(parse_declarations(&source).is_err());
    }

    #[test]
    fn test_unknown_type_is_one_byte() {
        let source =
            "struct __attribute__((packed)) Odd { Vector3 v; float f; };";
        let records = parse_declarations(source).unwrap();
        assert_eq!(
            records[0].fields,
            vec![
                Field::scalar("v", "Vector3", 0),
                Field::scalar("f", "float", 1),
            ]
        );
        assert_eq!(records[0].total_size, 5);
    }

    #[test]
    fn test_custom_table() {
        let table = TypeWidthTable::new().with_type("Vector3", 12);
        let parser = DeclarationParser::with_table(table);
        let source = "struct __attribute__((packed)) Odd { Vector3 v; float f; };";
        let records = parser.parse(source).unwrap();
        assert_eq!(records[0].fields[1].offset, 12);
        assert_eq!(records[0].total_size, 16);
    }

    #[test]
    fn test_malformed_members_are_skipped() {
        let source = r"struct __attribute__((packed)) Messy {
    float a;
    stray;
    float buf[N];
    float b = 1.5f;
};";
        let records = parse_declarations(source).unwrap();
        assert_eq!(
            records[0].fields,
            vec![Field::scalar("a", "float", 0), Field::scalar("b", "float", 4)]
        );
    }

    #[test]
    fn test_header_never_in_fields() {
        let source = r"struct __attribute__((packed)) Bare {
    char header[4];
    int32_t value;
};";
        let records = parse_declarations(source).unwrap();
        assert!(records[0].field("header").is_none());
        assert_eq!(records[0].header_tag, "");
        assert_eq!(records[0].fields, vec![Field::scalar("value", "int32_t", 4)]);
        assert_eq!(records[0].total_size, 8);
    }

    #[test]
    fn test_scalar_header_is_not_a_field() {
        let source = r"struct __attribute__((packed)) Scalar {
    uint32_t header;
    float a;
};";
        let records = parse_declarations(source).unwrap();
        assert!(records[0].field("header").is_none());
        assert_eq!(records[0].header_tag, "");
        assert_eq!(records[0].fields, vec![Field::scalar("a", "float", 4)]);
        assert_eq!(records[0].total_size, 8);
    }

    #[test]
    fn test_misplaced_header_still_seeds_offset() {
        let source = r"struct __attribute__((packed)) Late {
    float a;
    char header[4] = {'L', 'A', 'T', '\0'};
    float b;
};";
        let records = parse_declarations(source).unwrap();
        assert_eq!(records[0].header_tag, "LAT");
        assert_eq!(
            records[0].fields,
            vec![Field::scalar("a", "float", 4), Field::scalar("b", "float", 8)]
        );
        assert_eq!(records[0].total_size, 12);
    }

    #[test]
    fn test_wide_header_still_seeds_four_bytes() {
        let source = r"struct __attribute__((packed)) Wide {
    char header[8] = {'L', 'O', 'N', 'G', 'T', 'A', 'G', '\0'};
    double time;
};";
        let records = parse_declarations(source).unwrap();
        assert_eq!(records[0].header_tag, "LONGTAG");
        assert_eq!(records[0].fields, vec![Field::scalar("time", "double", 4)]);
        assert_eq!(records[0].total_size, 12);
    }

    #[test]
    fn test_repeated_header_keeps_first_tag() {
        let source = r"struct __attribute__((packed)) Twice {
    char header[4] = {'O', 'N', 'E', '\0'};
    char header[4] = {'T', 'W', 'O', '\0'};
    float a;
};";
        let records = parse_declarations(source).unwrap();
        assert_eq!(records[0].header_tag, "ONE");
        assert_eq!(records[0].fields, vec![Field::scalar("a", "float", 4)]);
    }

    #[test]
    fn test_double_slash_in_literal_truncates_line() {
        // The initializer's "//" starts a comment, so the rest of the line
        // is lost and the following member joins the header statement.
        let source = r#"struct __attribute__((packed)) Slashes {
    char header[4] = "//";
    float f;
    float g;
};"#;
        let records = parse_declarations(source).unwrap();
        assert_eq!(records[0].header_tag, "");
        assert!(records[0].field("f").is_none());
        assert_eq!(records[0].fields, vec![Field::scalar("g", "float", 4)]);
        assert_eq!(records[0].total_size, 8);
    }

    #[test]
    fn test_overflowing_array_is_skipped() {
        let source = r"struct __attribute__((packed)) Huge {
    float a;
    uint64_t big[3000000000000000000];
    float b;
    uint8_t beyond[99999999999999999999999];
};";
        let records = parse_declarations(source).unwrap();
        assert_eq!(
            records[0].fields,
            vec![Field::scalar("a", "float", 0), Field::scalar("b", "float", 4)]
        );
        assert_eq!(records[0].total_size, 8);
    }

    #[test]
    fn test_full_width_tag_and_escapes() {
        let tag = decode_header_tag("{'G', 'P', 'S', 'X'}");
        assert_eq!(tag, "GPSX");

        let tag = decode_header_tag(r"{'\x41', '\102', '\'', '\0'}");
        assert_eq!(tag, "AB'");

        let tag = decode_header_tag(r"{'\0', '\0', '\0', '\0'}");
        assert_eq!(tag, "");
    }

    #[test]
    fn test_brace_on_next_line_and_spaced_brackets() {
        let source = r"struct __attribute__((__packed__)) Spaced
{
    float cov [ 3 ];
    int32_t n;
}
;";
        let records = parse_declarations(source).unwrap();
        assert_eq!(
            records[0].fields,
            vec![
                Field::array("cov", "float", 3, 0),
                Field::scalar("n", "int32_t", 12),
            ]
        );
    }

    #[test]
    fn test_forward_declaration_is_ignored() {
        let source = "struct __attribute__((packed)) Later;\nstruct __attribute__((packed)) Now { char c; };";
        let records = parse_declarations(source).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Now");
    }

    #[test]
    fn test_offsets_are_contiguous() {
        let source = r"struct __attribute__((packed)) Mixed {
    char header[4] = {'M', 'I', 'X', '\0'};
    uint8_t a;
    double b;
    int16_t c[3];
    unsigned long d;
};";
        let parser = DeclarationParser::new();
        let record = &parser.parse(source).unwrap()[0];
        let mut expected = 4;
        for field in &record.fields {
            assert_eq!(field.offset, expected);
            expected = field.end(parser.table()).unwrap();
        }
        assert_eq!(record.total_size, expected);
    }
}
