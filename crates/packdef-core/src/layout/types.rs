//! Scalar type widths.
//!
//! Packed layouts have no padding, so a field's size is fully determined by
//! the byte width of its scalar type and its array length. The width table
//! below covers the fixed-width and builtin C scalar types used in packed
//! telemetry headers.
//!
//! Lookup is total: a name that is not in the table resolves to
//! [`FALLBACK_WIDTH`] instead of failing, so that layout computation never
//! aborts on an unrecognized type.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Width assigned to type names that are not in the table
pub const FALLBACK_WIDTH: usize = 1;

/// Builtin scalar widths in bytes
const BUILTIN_WIDTHS: &[(&str, usize)] = &[
    ("char", 1),
    ("signed char", 1),
    ("unsigned char", 1),
    ("bool", 1),
    ("int8_t", 1),
    ("uint8_t", 1),
    ("short", 2),
    ("unsigned short", 2),
    ("int16_t", 2),
    ("uint16_t", 2),
    ("int", 4),
    ("unsigned int", 4),
    ("int32_t", 4),
    ("uint32_t", 4),
    ("float", 4),
    ("long", 8),
    ("unsigned long", 8),
    ("long long", 8),
    ("unsigned long long", 8),
    ("int64_t", 8),
    ("uint64_t", 8),
    ("double", 8),
];

/// Mapping from scalar type name to byte width
#[derive(Debug, Clone)]
pub struct TypeWidthTable {
    widths: HashMap<String, usize>,
}

impl Default for TypeWidthTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeWidthTable {
    /// Creates a table holding the builtin scalar widths
    pub fn new() -> Self {
        Self {
            widths: BUILTIN_WIDTHS
                .iter()
                .map(|&(name, width)| (name.to_string(), width))
                .collect(),
        }
    }

    /// Registers or overrides the width of a type
    pub fn with_type(mut self, name: impl AsRef<str>, width: usize) -> Self {
        self.widths.insert(normalize(name.as_ref()), width);
        self
    }

    /// Applies a `NAME=WIDTH` override, as given on the command line
    pub fn with_override(self, spec: &str) -> Result<Self> {
        let invalid = || Error::InvalidTypeWidth {
            spec: spec.to_string(),
        };

        let (name, width) = spec.rsplit_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        let width: usize = width.trim().parse().map_err(|_| invalid())?;
        if name.is_empty() || width == 0 {
            return Err(invalid());
        }

        Ok(self.with_type(name, width))
    }

    /// Returns the width of a type, falling back to [`FALLBACK_WIDTH`]
    pub fn width(&self, type_name: &str) -> usize {
        self.lookup(type_name).unwrap_or(FALLBACK_WIDTH)
    }

    /// Returns true if the type has an explicit entry in the table
    pub fn is_known(&self, type_name: &str) -> bool {
        self.lookup(type_name).is_some()
    }

    fn lookup(&self, type_name: &str) -> Option<usize> {
        match self.widths.get(type_name) {
            Some(&width) => Some(width),
            // Only pay for normalization when the name has irregular spacing
            None => self.widths.get(&normalize(type_name)).copied(),
        }
    }
}

/// Collapses runs of whitespace so `unsigned  int` and `unsigned int` agree
fn normalize(type_name: &str) -> String {
    type_name.split_whitespace().collect::<Vec<_>>().join(" ")
}
