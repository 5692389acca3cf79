use std::fmt;
use std::str::FromStr;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

use super::error::SchemaConfigError;

/// Logical column and layer types understood by the schema.
///
/// Serialized with the lowercase names used in schema override files. The legacy
/// spellings `categorical__large_string` and `bool_` are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    /// UTF-8 string with 64-bit offsets
    #[serde(rename = "large_string")]
    LargeString,
    /// UTF-8 string with 32-bit offsets
    #[serde(rename = "string")]
    String,
    /// Dictionary-encoded large string (Int32 keys)
    #[serde(rename = "categorical_string", alias = "categorical__large_string")]
    Categorical,
    /// Signed 64-bit integer
    #[serde(rename = "int64")]
    Int64,
    /// Signed 32-bit integer
    #[serde(rename = "int32")]
    Int32,
    /// Unsigned 8-bit integer
    #[serde(rename = "uint8")]
    UInt8,
    /// Unsigned 32-bit integer
    #[serde(rename = "uint32")]
    UInt32,
    /// 32-bit float
    #[serde(rename = "float32")]
    Float32,
    /// Boolean
    #[serde(rename = "bool", alias = "bool_")]
    Bool,
}

impl LogicalType {
    /// Arrow data type used for columns of this logical type.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::LargeString => DataType::LargeUtf8,
            Self::String => DataType::Utf8,
            Self::Categorical => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::LargeUtf8))
            }
            Self::Int64 => DataType::Int64,
            Self::Int32 => DataType::Int32,
            Self::UInt8 => DataType::UInt8,
            Self::UInt32 => DataType::UInt32,
            Self::Float32 => DataType::Float32,
            Self::Bool => DataType::Boolean,
        }
    }

    /// True for string and categorical types.
    pub fn is_string_like(&self) -> bool {
        matches!(self, Self::LargeString | Self::String | Self::Categorical)
    }

    /// True for integer types.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int64 | Self::Int32 | Self::UInt8 | Self::UInt32)
    }

    /// True for integer and floating point types.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float32)
    }

    /// Canonical name as written in schema files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LargeString => "large_string",
            Self::String => "string",
            Self::Categorical => "categorical_string",
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::UInt8 => "uint8",
            Self::UInt32 => "uint32",
            Self::Float32 => "float32",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalType {
    type Err = SchemaConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "large_string" => Ok(Self::LargeString),
            "string" => Ok(Self::String),
            "categorical_string" | "categorical__large_string" => Ok(Self::Categorical),
            "int64" => Ok(Self::Int64),
            "int32" => Ok(Self::Int32),
            "uint8" => Ok(Self::UInt8),
            "uint32" => Ok(Self::UInt32),
            "float32" => Ok(Self::Float32),
            "bool" | "bool_" => Ok(Self::Bool),
            other => Err(SchemaConfigError::UnknownType(other.to_string())),
        }
    }
}

/// A named, typed column. Column groups are ordered sequences of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Logical type
    #[serde(rename = "type")]
    pub dtype: LogicalType,
}

impl ColumnSpec {
    /// Create a column spec.
    pub fn new(name: impl Into<String>, dtype: LogicalType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Storage orientation of an expression layer, encoded by the `row_`/`col_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Cells are the outer dimension (CSR)
    Row,
    /// Genes are the outer dimension (CSC)
    Column,
}

/// Content of an expression layer, encoded by the `_raw`/`_norm` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Integer counts copied from the primary matrix
    Raw,
    /// Library-size normalized, log1p transformed counts
    Normalized,
}

/// A configured expression matrix layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer name, e.g. `row_raw`
    pub name: String,
    /// Numeric type of stored values
    #[serde(rename = "type")]
    pub dtype: LogicalType,
}

impl LayerSpec {
    /// Create a layer spec.
    pub fn new(name: impl Into<String>, dtype: LogicalType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }

    /// Parse orientation and kind from the layer name.
    pub fn parse_name(&self) -> Result<(Orientation, LayerKind), SchemaConfigError> {
        let bad = || SchemaConfigError::InvalidLayerName(self.name.clone());
        let (prefix, suffix) = self.name.split_once('_').ok_or_else(bad)?;
        let orientation = match prefix {
            "row" => Orientation::Row,
            "col" => Orientation::Column,
            _ => return Err(bad()),
        };
        let kind = match suffix {
            "raw" => LayerKind::Raw,
            "norm" => LayerKind::Normalized,
            _ => return Err(bad()),
        };
        Ok((orientation, kind))
    }

    /// True for the canonical row-major raw layer, which is the primary matrix itself.
    pub fn is_canonical(&self) -> bool {
        self.name == super::CANONICAL_LAYER
    }
}
