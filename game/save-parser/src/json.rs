//! Conversion of decoded properties into JSON blobs for the store.

use gvas::{
    clean_property_name, ArrayValue, ByteValue, MapScalar, MapValue, Property, PropertyValue,
    StructValue, Transform,
};
use serde_json::{json, Map, Value};

pub fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < (i64::MAX as f64) {
        json!(v as i64)
    } else {
        serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn property_value_to_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Bool(v) => json!(v),
        PropertyValue::Int(v) => json!(v),
        PropertyValue::UInt32(v) => json!(v),
        PropertyValue::Float(v) => number(*v),
        PropertyValue::Str(v) => json!(v),
        PropertyValue::Enum { value, .. } => json!(value),
        PropertyValue::Byte(ByteValue::Raw(v)) => json!(v),
        PropertyValue::Byte(ByteValue::Enumerator(v)) => json!(v),
        PropertyValue::Text | PropertyValue::Skipped => Value::Null,
        PropertyValue::Struct(s) => struct_to_json(s),
        PropertyValue::Array(a) => array_to_json(a),
        PropertyValue::Map(m) => map_to_json(m),
    }
}

pub fn struct_to_json(value: &StructValue) -> Value {
    match value {
        StructValue::Vector { x, y, z } => json!({"x": x, "y": y, "z": z}),
        StructValue::Rotator { pitch, yaw, roll } => {
            json!({"pitch": pitch, "yaw": yaw, "roll": roll})
        }
        StructValue::Quat { x, y, z, w } => json!({"x": x, "y": y, "z": z, "w": w}),
        StructValue::Guid(g) => json!(g),
        StructValue::LinearColor { r, g, b, a } => json!({"r": r, "g": g, "b": b, "a": a}),
        StructValue::DateTime(v) | StructValue::Timespan(v) => json!(v),
        StructValue::Vector2D { x, y } => json!({"x": x, "y": y}),
        StructValue::GameplayTags(tags) => json!(tags),
        StructValue::Path(p) => json!(p),
        StructValue::Transform(t) => transform_to_json(t),
        StructValue::Generic { children, .. } => children_to_json(children),
    }
}

pub fn transform_to_json(t: &Transform) -> Value {
    let mut obj = Map::new();
    if let Some((x, y, z)) = t.translation {
        obj.insert("translation".into(), json!({"x": x, "y": y, "z": z}));
    }
    if let Some((x, y, z, w)) = t.rotation {
        obj.insert("rotation".into(), json!({"x": x, "y": y, "z": z, "w": w}));
    }
    if let Some((x, y, z)) = t.scale {
        obj.insert("scale".into(), json!({"x": x, "y": y, "z": z}));
    }
    Value::Object(obj)
}

pub fn array_to_json(value: &ArrayValue) -> Value {
    match value {
        ArrayValue::Structs { elements, .. } => {
            Value::Array(elements.iter().map(struct_to_json).collect())
        }
        ArrayValue::Slots(slots) => serde_json::to_value(slots).unwrap_or(Value::Null),
        ArrayValue::Strings(v) => json!(v),
        ArrayValue::Ints(v) => json!(v),
        ArrayValue::Floats(v) => json!(v),
        ArrayValue::Bools(v) => json!(v),
        ArrayValue::Bytes(v) => json!(v),
        ArrayValue::Skipped { count } => json!(format!("<skipped {}>", count)),
        ArrayValue::Unknown => Value::Null,
    }
}

pub fn map_to_json(value: &MapValue) -> Value {
    match value {
        MapValue::Entries(entries) => {
            let mut obj = Map::new();
            for (k, v) in entries {
                let key = match k {
                    MapScalar::Str(s) => s.clone(),
                    MapScalar::Int(v) => v.to_string(),
                    MapScalar::Float(v) => v.to_string(),
                    MapScalar::Bool(v) => v.to_string(),
                };
                let val = match v {
                    MapScalar::Str(s) => json!(s),
                    MapScalar::Int(v) => json!(v),
                    MapScalar::Float(v) => number(*v),
                    MapScalar::Bool(v) => json!(v),
                };
                obj.insert(key, val);
            }
            Value::Object(obj)
        }
        MapValue::Skipped => Value::Null,
    }
}

/// Flattens a child property list into a key-value object keyed by cleaned
/// property names.
pub fn children_to_json(children: &[Property]) -> Value {
    let mut obj = Map::new();
    for c in children {
        obj.insert(
            clean_property_name(&c.name).to_string(),
            property_value_to_json(&c.value),
        );
    }
    Value::Object(obj)
}
