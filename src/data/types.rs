//! Column and field type enums

use serde::{Deserialize, Serialize};

/// Storage type of a materialised column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// No storage; placeholder for columns that carry no data.
    Void,
    /// One signed byte per row; `i8::MIN` marks a missing value.
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Variable-width UTF-8 strings addressed by 32-bit signed offsets.
    String32,
}

impl ColumnType {
    /// Bytes per element in the column's fixed-width buffer. For string
    /// columns this is the width of one offsets entry.
    pub fn elem_size(self) -> usize {
        match self {
            ColumnType::Void => 0,
            ColumnType::Bool => 1,
            ColumnType::Int32 | ColumnType::Float32 | ColumnType::String32 => 4,
            ColumnType::Int64 | ColumnType::Float64 => 8,
        }
    }

    pub fn is_string(self) -> bool {
        self == ColumnType::String32
    }
}

/// Type code of one field as seen by the tokenizer.
///
/// The bare variants are what type inference produces; the remaining codes
/// are reachable through the column-override hook and differ only in parser
/// strictness (`Float64Ext` additionally accepts `NaN`/`Inf` word forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// The column is excluded from the output; no storage is allocated.
    Drop,
    Bool,
    Int32Bare,
    Int32,
    Int64,
    Float32,
    Float64Bare,
    Float64,
    Float64Ext,
    String,
}

impl FieldType {
    /// Storage type this field materialises as; `None` for dropped fields.
    pub fn column_type(self) -> Option<ColumnType> {
        match self {
            FieldType::Drop => None,
            FieldType::Bool => Some(ColumnType::Bool),
            FieldType::Int32Bare | FieldType::Int32 => Some(ColumnType::Int32),
            FieldType::Int64 => Some(ColumnType::Int64),
            FieldType::Float32 => Some(ColumnType::Float32),
            FieldType::Float64Bare | FieldType::Float64 | FieldType::Float64Ext => {
                Some(ColumnType::Float64)
            }
            FieldType::String => Some(ColumnType::String32),
        }
    }

    /// Width of this field's staging cell: 0 (dropped), 1, 4, or 8 bytes.
    /// String fields stage an 8-byte `{len, off}` descriptor.
    pub fn cell_size(self) -> usize {
        match self {
            FieldType::Drop => 0,
            FieldType::Bool => 1,
            FieldType::Int32Bare | FieldType::Int32 | FieldType::Float32 => 4,
            FieldType::Int64
            | FieldType::Float64Bare
            | FieldType::Float64
            | FieldType::Float64Ext
            | FieldType::String => 8,
        }
    }

    pub fn is_string(self) -> bool {
        self == FieldType::String
    }

    /// Position on the widening ladder. A type bump only ever moves a field
    /// to a strictly higher rank, which bounds the number of re-read passes.
    pub fn rank(self) -> u8 {
        match self {
            FieldType::Drop => 0,
            FieldType::Bool => 1,
            FieldType::Int32Bare | FieldType::Int32 => 2,
            FieldType::Int64 => 3,
            FieldType::Float32 => 4,
            FieldType::Float64Bare | FieldType::Float64 | FieldType::Float64Ext => 5,
            FieldType::String => 6,
        }
    }

    /// The wider of two field types, used when merging bump requests.
    pub fn widen(self, other: FieldType) -> FieldType {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}
