//! Serde model of the YAML schema document.

use crate::layout::DEFAULT_TIME_FIELD;
use serde::{Deserialize, Serialize};

/// Schema document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Packet layouts in document order
    #[serde(default)]
    pub packets: Vec<PacketDescriptor>,
}

/// One packet layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketDescriptor {
    /// Packet identifier, the record name without its `Data` suffix
    pub id: String,
    /// Magic tag carried in the first 4 bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_string: Option<String>,
    /// Total packet size in bytes
    pub size_check: usize,
    /// Name of the timestamp field
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Fields, not necessarily in offset order
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

/// One field of a packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Scalar type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Byte offset from the start of the packet
    pub offset: usize,
    /// Element count for array fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

fn default_time_field() -> String {
    DEFAULT_TIME_FIELD.to_string()
}
