//! Table schema model.
//!
//! The schema is stored in `metaData.schemaString` as JSON:
//!
//! ```json
//! {"type":"struct","fields":[
//!   {"name":"id","type":"long","nullable":true,"metadata":{}},
//!   {"name":"tags","type":{"type":"array","elementType":"string","containsNull":true},"nullable":true,"metadata":{}}
//! ]}
//! ```
//!
//! This module models that JSON, validates it, and converts it to an Arrow
//! schema for scans. [`merge`] folds successive schemas into the effective
//! one.
use std::{collections::HashMap, fmt, sync::Arc};

use arrow::datatypes::{
    DataType as ArrowDataType, Field, FieldRef, Fields, Schema, SchemaRef, TimeUnit,
};
use serde::{Deserialize, Serialize};

pub mod merge;

pub use merge::{merge_schema, validate_schema, SchemaEvolutionError};

/// Maximum decimal precision supported by the table format.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Top-level or nested struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(rename = "type", default = "struct_type_name")]
    type_name: String,
    /// Ordered child fields.
    pub fields: Vec<StructField>,
}

fn struct_type_name() -> String {
    "struct".to_string()
}

impl StructType {
    /// Build a struct from fields, in order.
    pub fn new(fields: Vec<StructField>) -> Self {
        StructType {
            type_name: struct_type_name(),
            fields,
        }
    }

    /// Parse a `schemaString`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize back to the `schemaString` form.
    pub fn to_json(&self) -> String {
        // Serializing plain data with string keys cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    /// Field by exact name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field by exact name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Convert to an Arrow schema. Field metadata is not carried over.
    pub fn to_arrow_schema(&self) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .map(StructField::to_arrow_field)
                .collect::<Vec<_>>(),
        )
    }

    /// Convert to a shared Arrow schema.
    pub fn to_arrow_schema_ref(&self) -> SchemaRef {
        Arc::new(self.to_arrow_schema())
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct<")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, ">")
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the column may contain nulls.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Free-form column metadata (comments, column mapping ids, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_nullable() -> bool {
    true
}

impl StructField {
    /// A field without metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>, nullable: bool) -> Self {
        StructField {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            metadata: HashMap::new(),
        }
    }

    /// The same field with `nullable` set.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Convert to an Arrow field.
    pub fn to_arrow_field(&self) -> Field {
        Field::new(self.name.clone(), self.data_type.to_arrow(), self.nullable)
    }
}

impl fmt::Display for StructField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}: {}", self.name, self.data_type)
        } else {
            write!(f, "{}: {} not null", self.name, self.data_type)
        }
    }
}

/// Array type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayType {
    #[serde(rename = "type")]
    type_name: String,
    /// Element type.
    pub element_type: DataType,
    /// Whether elements may be null.
    #[serde(default = "default_nullable")]
    pub contains_null: bool,
}

impl ArrayType {
    /// An array of `element_type`.
    pub fn new(element_type: impl Into<DataType>, contains_null: bool) -> Self {
        ArrayType {
            type_name: "array".to_string(),
            element_type: element_type.into(),
            contains_null,
        }
    }
}

/// Map type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapType {
    #[serde(rename = "type")]
    type_name: String,
    /// Key type.
    pub key_type: DataType,
    /// Value type.
    pub value_type: DataType,
    /// Whether values may be null.
    #[serde(default = "default_nullable")]
    pub value_contains_null: bool,
}

impl MapType {
    /// A map from `key_type` to `value_type`.
    pub fn new(
        key_type: impl Into<DataType>,
        value_type: impl Into<DataType>,
        value_contains_null: bool,
    ) -> Self {
        MapType {
            type_name: "map".to_string(),
            key_type: key_type.into(),
            value_type: value_type.into(),
            value_contains_null,
        }
    }
}

/// Any column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataType {
    /// Scalar type such as `long` or `decimal(10,2)`.
    Primitive(PrimitiveType),
    /// Nested struct.
    Struct(Box<StructType>),
    /// Array of a single element type.
    Array(Box<ArrayType>),
    /// Key/value map.
    Map(Box<MapType>),
}

impl DataType {
    /// The primitive type, if this is one.
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            DataType::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// Convert to the Arrow type used when materialising this column.
    pub fn to_arrow(&self) -> ArrowDataType {
        match self {
            DataType::Primitive(p) => p.to_arrow(),
            DataType::Struct(s) => ArrowDataType::Struct(Fields::from(
                s.fields
                    .iter()
                    .map(StructField::to_arrow_field)
                    .collect::<Vec<_>>(),
            )),
            DataType::Array(a) => ArrowDataType::List(Arc::new(Field::new(
                "element",
                a.element_type.to_arrow(),
                a.contains_null,
            ))),
            DataType::Map(m) => {
                let entries: Vec<FieldRef> = vec![
                    Arc::new(Field::new("key", m.key_type.to_arrow(), false)),
                    Arc::new(Field::new(
                        "value",
                        m.value_type.to_arrow(),
                        m.value_contains_null,
                    )),
                ];
                ArrowDataType::Map(
                    Arc::new(Field::new(
                        "key_value",
                        ArrowDataType::Struct(Fields::from(entries)),
                        false,
                    )),
                    false,
                )
            }
        }
    }
}

impl From<PrimitiveType> for DataType {
    fn from(p: PrimitiveType) -> Self {
        DataType::Primitive(p)
    }
}

impl From<StructType> for DataType {
    fn from(s: StructType) -> Self {
        DataType::Struct(Box::new(s))
    }
}

impl From<ArrayType> for DataType {
    fn from(a: ArrayType) -> Self {
        DataType::Array(Box::new(a))
    }
}

impl From<MapType> for DataType {
    fn from(m: MapType) -> Self {
        DataType::Map(Box::new(m))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{p}"),
            DataType::Struct(s) => write!(f, "{s}"),
            DataType::Array(a) => write!(f, "array<{}>", a.element_type),
            DataType::Map(m) => write!(f, "map<{}, {}>", m.key_type, m.value_type),
        }
    }
}

/// Scalar column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrimitiveType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Long,
    /// 32-bit signed integer.
    Integer,
    /// 16-bit signed integer.
    Short,
    /// 8-bit signed integer.
    Byte,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Boolean,
    /// Variable-length bytes.
    Binary,
    /// Days since the epoch.
    Date,
    /// Microseconds since the epoch, UTC-adjusted.
    Timestamp,
    /// Microseconds since the epoch, no timezone.
    TimestampNtz,
    /// Fixed-point decimal.
    Decimal {
        /// Total digits.
        precision: u8,
        /// Digits after the point.
        scale: u8,
    },
}

impl PrimitiveType {
    /// Convert to the Arrow type used when materialising this column.
    pub fn to_arrow(self) -> ArrowDataType {
        match self {
            PrimitiveType::String => ArrowDataType::Utf8,
            PrimitiveType::Long => ArrowDataType::Int64,
            PrimitiveType::Integer => ArrowDataType::Int32,
            PrimitiveType::Short => ArrowDataType::Int16,
            PrimitiveType::Byte => ArrowDataType::Int8,
            PrimitiveType::Float => ArrowDataType::Float32,
            PrimitiveType::Double => ArrowDataType::Float64,
            PrimitiveType::Boolean => ArrowDataType::Boolean,
            PrimitiveType::Binary => ArrowDataType::Binary,
            PrimitiveType::Date => ArrowDataType::Date32,
            PrimitiveType::Timestamp => {
                ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
            PrimitiveType::TimestampNtz => ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
            PrimitiveType::Decimal { precision, scale } => {
                ArrowDataType::Decimal128(precision, scale as i8)
            }
        }
    }

    /// Integral types, ordered by width.
    pub fn integer_rank(self) -> Option<u8> {
        match self {
            PrimitiveType::Byte => Some(1),
            PrimitiveType::Short => Some(2),
            PrimitiveType::Integer => Some(3),
            PrimitiveType::Long => Some(4),
            _ => None,
        }
    }

    /// Whether the type is integral or floating point.
    pub fn is_numeric(self) -> bool {
        self.integer_rank().is_some()
            || matches!(
                self,
                PrimitiveType::Float | PrimitiveType::Double | PrimitiveType::Decimal { .. }
            )
    }
}

impl TryFrom<String> for PrimitiveType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(match s.as_str() {
            "string" => PrimitiveType::String,
            "long" => PrimitiveType::Long,
            "integer" => PrimitiveType::Integer,
            "short" => PrimitiveType::Short,
            "byte" => PrimitiveType::Byte,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "boolean" => PrimitiveType::Boolean,
            "binary" => PrimitiveType::Binary,
            "date" => PrimitiveType::Date,
            "timestamp" => PrimitiveType::Timestamp,
            "timestamp_ntz" => PrimitiveType::TimestampNtz,
            other => return parse_decimal(other),
        })
    }
}

fn parse_decimal(s: &str) -> Result<PrimitiveType, String> {
    let inner = s
        .strip_prefix("decimal(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| format!("unsupported type {s:?}"))?;
    let (p, sc) = inner
        .split_once(',')
        .ok_or_else(|| format!("malformed decimal type {s:?}"))?;
    let precision: u8 = p
        .trim()
        .parse()
        .map_err(|_| format!("malformed decimal precision in {s:?}"))?;
    let scale: u8 = sc
        .trim()
        .parse()
        .map_err(|_| format!("malformed decimal scale in {s:?}"))?;
    if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
        return Err(format!(
            "decimal precision must be 1..={MAX_DECIMAL_PRECISION} and scale <= precision, got {s:?}"
        ));
    }
    Ok(PrimitiveType::Decimal { precision, scale })
}

impl From<PrimitiveType> for String {
    fn from(p: PrimitiveType) -> Self {
        p.to_string()
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Integer => write!(f, "integer"),
            PrimitiveType::Short => write!(f, "short"),
            PrimitiveType::Byte => write!(f, "byte"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::TimestampNtz => write!(f, "timestamp_ntz"),
            PrimitiveType::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
        }
    }
}
