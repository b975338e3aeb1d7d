use binary_reader::ReaderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GvasError {
    #[error("missing GVAS magic")]
    NotGvas,
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// One tagged property as it appears in the save stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub type_tag: String,
    pub value: PropertyValue,
}

impl Property {
    /// Child lookup for nested property lists.
    pub fn child<'a>(children: &'a [Property], name: &str) -> Option<&'a Property> {
        children.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt32(u32),
    Float(f64),
    Str(String),
    Enum { enum_type: String, value: String },
    Byte(ByteValue),
    /// Body skipped, content is opaque rich text.
    Text,
    Struct(StructValue),
    Array(ArrayValue),
    Map(MapValue),
    /// SetProperty and unknown property types: body skipped.
    Skipped,
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            PropertyValue::Enum { value, .. } => Some(value),
            PropertyValue::Byte(ByteValue::Enumerator(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::UInt32(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Byte(ByteValue::Raw(v)) => Some(*v as f64),
            PropertyValue::Bool(v) => Some(*v as u8 as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::UInt32(v) => Some(*v as i64),
            PropertyValue::Float(v) => Some(*v as i64),
            PropertyValue::Byte(ByteValue::Raw(v)) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ByteValue {
    Raw(u8),
    Enumerator(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructValue {
    Vector { x: f64, y: f64, z: f64 },
    Rotator { pitch: f64, yaw: f64, roll: f64 },
    Quat { x: f64, y: f64, z: f64, w: f64 },
    Guid(String),
    LinearColor { r: f64, g: f64, b: f64, a: f64 },
    DateTime(i64),
    Timespan(i64),
    Vector2D { x: f64, y: f64 },
    GameplayTags(Vec<String>),
    /// TimerHandle / SoftClassPath / SoftObjectPath: a single path string.
    Path(String),
    Transform(Transform),
    Generic {
        struct_type: String,
        children: Vec<Property>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transform {
    pub translation: Option<(f64, f64, f64)>,
    pub rotation: Option<(f64, f64, f64, f64)>,
    pub scale: Option<(f64, f64, f64)>,
}

/// Inventory slot lifted out of an `S_Slots` struct array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotItem {
    pub item: String,
    pub amount: i64,
    pub durability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Inline or generic struct elements, all sharing one struct type.
    Structs {
        struct_type: String,
        elements: Vec<StructValue>,
    },
    /// `S_Slots` elements with `Item.RowName`/`Amount`/`Durability` lifted.
    Slots(Vec<SlotItem>),
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Bools(Vec<bool>),
    Bytes(Vec<u8>),
    /// Large geometry array whose body was skipped; only the count survives.
    Skipped { count: u32 },
    /// Unknown inner type, body skipped.
    Unknown,
}

impl ArrayValue {
    /// Element count, also defined for skipped arrays.
    pub fn count(&self) -> usize {
        match self {
            ArrayValue::Structs { elements, .. } => elements.len(),
            ArrayValue::Slots(v) => v.len(),
            ArrayValue::Strings(v) => v.len(),
            ArrayValue::Ints(v) => v.len(),
            ArrayValue::Floats(v) => v.len(),
            ArrayValue::Bools(v) => v.len(),
            ArrayValue::Bytes(v) => v.len(),
            ArrayValue::Skipped { count } => *count as usize,
            ArrayValue::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapScalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MapScalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapScalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MapScalar::Int(v) => Some(*v as f64),
            MapScalar::Float(v) => Some(*v),
            MapScalar::Bool(v) => Some(*v as u8 as f64),
            MapScalar::Str(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapValue {
    Entries(Vec<(MapScalar, MapScalar)>),
    Skipped,
}
