//! Packed record layout model and offset computation.
//!
//! A [`RecordLayout`] is the intermediate form shared by both conversion
//! directions. Declarations are laid out with a [`LayoutBuilder`], which
//! assigns each field the running byte offset and advances it by the
//! field's size. Schema documents carry their own offsets and are not
//! recomputed.
//!
//! ## Header
//!
//! Records may start with a 4-byte `char header[4]` magic tag. The header
//! is metadata about the record rather than a field: it never appears in
//! [`RecordLayout::fields`], but its bytes are part of the layout, so the
//! offset cursor starts at [`initial_offset`]`(true)` when one is present.

mod types;

use tracing::{trace, warn};

pub use types::{TypeWidthTable, FALLBACK_WIDTH};

/// Byte length of the `header` magic array
pub const HEADER_LEN: usize = 4;

/// Member name reserved for the magic tag
pub const HEADER_FIELD: &str = "header";

/// Time field name assumed when a schema does not name one
pub const DEFAULT_TIME_FIELD: &str = "time";

/// Returns the offset of the first schema-visible field.
///
/// The header occupies bytes `0..HEADER_LEN` when present.
pub fn initial_offset(header_present: bool) -> usize {
    if header_present {
        HEADER_LEN
    } else {
        0
    }
}

/// A single member of a packed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Member name
    pub name: String,
    /// Scalar type name, as a key into [`TypeWidthTable`]
    pub type_name: String,
    /// Element count for fixed-size arrays, `None` for scalars
    pub array_length: Option<usize>,
    /// Byte offset from the start of the record
    pub offset: usize,
}

impl Field {
    /// Creates a scalar field
    pub fn scalar(name: impl Into<String>, type_name: impl Into<String>, offset: usize) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            array_length: None,
            offset,
        }
    }

    /// Creates a fixed-size array field
    pub fn array(
        name: impl Into<String>,
        type_name: impl Into<String>,
        length: usize,
        offset: usize,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            array_length: Some(length),
            offset,
        }
    }

    /// Returns true if this field is a fixed-size array
    pub fn is_array(&self) -> bool {
        self.array_length.is_some()
    }

    /// Size in bytes: type width times array length.
    ///
    /// Returns `None` when the product does not fit in a `usize`.
    pub fn size(&self, table: &TypeWidthTable) -> Option<usize> {
        table
            .width(&self.type_name)
            .checked_mul(self.array_length.unwrap_or(1))
    }

    /// Offset immediately after this field, `None` on overflow
    pub fn end(&self, table: &TypeWidthTable) -> Option<usize> {
        self.size(table)
            .and_then(|size| self.offset.checked_add(size))
    }
}

/// Layout of one packed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Struct identifier, e.g. `IMUData`
    pub name: String,
    /// Magic tag from the `header` array, empty when absent
    pub header_tag: String,
    /// Name of the timestamp field, carried through schema documents
    pub time_field: String,
    /// Fields in offset order, never including `header`
    pub fields: Vec<Field>,
    /// Total size in bytes, header included
    pub total_size: usize,
}

impl RecordLayout {
    /// Creates an empty layout with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header_tag: String::new(),
            time_field: DEFAULT_TIME_FIELD.to_string(),
            fields: Vec::new(),
            total_size: 0,
        }
    }

    /// Offset of the first field, or 0 for an empty record
    pub fn first_offset(&self) -> usize {
        self.fields.first().map_or(0, |f| f.offset)
    }

    /// Furthest field end, or `None` for an empty record.
    ///
    /// A field whose end overflows counts as ending at `usize::MAX`.
    pub fn fields_end(&self, table: &TypeWidthTable) -> Option<usize> {
        self.fields
            .iter()
            .map(|f| f.end(table).unwrap_or(usize::MAX))
            .max()
    }

    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Lays out fields left to right with no padding
#[derive(Debug)]
pub struct LayoutBuilder<'a> {
    table: &'a TypeWidthTable,
    layout: RecordLayout,
    cursor: usize,
}

impl<'a> LayoutBuilder<'a> {
    /// Starts a layout, seeding the cursor past the header when present
    pub fn new(table: &'a TypeWidthTable, name: impl Into<String>, header_present: bool) -> Self {
        Self {
            table,
            layout: RecordLayout::new(name),
            cursor: initial_offset(header_present),
        }
    }

    /// Sets the magic tag
    pub fn header_tag(mut self, tag: impl Into<String>) -> Self {
        self.layout.header_tag = tag.into();
        self
    }

    /// Appends a field at the current cursor and advances past it.
    ///
    /// A field whose end would not fit in a `usize` is skipped with a
    /// warning and `None` is returned; the cursor does not move.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        array_length: Option<usize>,
    ) -> Option<&Field> {
        let field = Field {
            name: name.into(),
            type_name: type_name.into(),
            array_length,
            offset: self.cursor,
        };

        if !self.table.is_known(&field.type_name) {
            warn!(
                "Unknown type '{}' for {}.{}, assuming {} byte(s)",
                field.type_name, self.layout.name, field.name, FALLBACK_WIDTH
            );
        }

        let Some(next) = field.end(self.table) else {
            warn!(
                "Skipping {}.{}: {}[{}] overflows the record size",
                self.layout.name,
                field.name,
                field.type_name,
                field.array_length.unwrap_or(1)
            );
            return None;
        };

        self.cursor = next;
        trace!(
            "{}.{} at offset {} (next {})",
            self.layout.name,
            field.name,
            field.offset,
            self.cursor
        );

        self.layout.fields.push(field);
        self.layout.fields.last()
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Finishes the layout; total size is the final cursor
    pub fn finish(mut self) -> RecordLayout {
        self.layout.total_size = self.cursor;
        self.layout
    }
}
