use binary_reader::{BinaryReader, ReaderError};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{
    ArrayValue, ByteValue, GvasError, MapScalar, MapValue, Property, PropertyValue, SlotItem,
    StructValue, Transform,
};

/// Map properties whose entries are decoded; every other map body is skipped.
const CAPTURED_MAPS: [&str; 6] = [
    "GameStats",
    "FloatData",
    "CustomData",
    "LODHouseData",
    "RandQuestConfig",
    "SGlobalContainerSave",
];

static NAME_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d+_[0-9A-Fa-f]{32}$").unwrap());

/// Strips the `_N_<32-hex-guid>` suffix the engine appends to instanced
/// property names.
pub fn clean_property_name(name: &str) -> &str {
    match NAME_SUFFIX_RE.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Skip the bodies of large Transform/Vector/Rotator arrays entirely.
    pub skip_large_arrays: bool,
    pub large_array_threshold: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            skip_large_arrays: true,
            large_array_threshold: 3000,
        }
    }
}

/// Decodes one tagged property from the current cursor.
///
/// `Ok(None)` means the `None` terminator, end of stream, or an unrecoverable
/// mid-property failure. Callers detect the latter by the cursor not having
/// moved and run forward recovery.
pub fn read_property(
    r: &mut BinaryReader,
    opts: &ReadOptions,
) -> Result<Option<Property>, GvasError> {
    let start = r.mark();
    let name = match r.read_fstring() {
        Ok(name) => name,
        Err(_) => {
            r.restore(start);
            return Ok(None);
        }
    };
    if name == "None" {
        return Ok(None);
    }
    match read_property_body(r, &name, opts, start) {
        Ok(prop) => Ok(prop),
        // cursor restoration is not guaranteed here
        Err(_) => Ok(None),
    }
}

fn read_property_body(
    r: &mut BinaryReader,
    name: &str,
    opts: &ReadOptions,
    start: usize,
) -> Result<Option<Property>, ReaderError> {
    let type_tag = r.read_fstring()?;
    let data_size = r.read_i64()?;
    if data_size < 0 || data_size as usize > r.len() {
        r.restore(start);
        return Ok(None);
    }
    let data_size = data_size as usize;

    let value = match type_tag.as_str() {
        "BoolProperty" => {
            let v = r.read_bool()?;
            r.skip(1)?;
            PropertyValue::Bool(v)
        }
        "IntProperty" => {
            r.skip(1)?;
            PropertyValue::Int(r.read_i32()? as i64)
        }
        "UInt32Property" => {
            r.skip(1)?;
            PropertyValue::UInt32(r.read_u32()?)
        }
        "Int64Property" => {
            r.skip(1)?;
            PropertyValue::Int(r.read_i64()?)
        }
        "FloatProperty" => {
            r.skip(1)?;
            PropertyValue::Float(r.read_f32()? as f64)
        }
        "DoubleProperty" => {
            r.skip(1)?;
            PropertyValue::Float(r.read_f64()?)
        }
        "StrProperty" | "NameProperty" | "SoftObjectProperty" | "ObjectProperty" => {
            r.skip(1)?;
            PropertyValue::Str(r.read_fstring()?)
        }
        "EnumProperty" => {
            let enum_type = r.read_fstring()?;
            r.skip(1)?;
            PropertyValue::Enum {
                enum_type,
                value: r.read_fstring()?,
            }
        }
        "ByteProperty" => {
            let enum_name = r.read_fstring()?;
            r.skip(1)?;
            if enum_name == "None" {
                PropertyValue::Byte(ByteValue::Raw(r.read_u8()?))
            } else {
                PropertyValue::Byte(ByteValue::Enumerator(r.read_fstring()?))
            }
        }
        "TextProperty" => {
            r.skip(1)?;
            r.skip(data_size)?;
            PropertyValue::Text
        }
        "StructProperty" => PropertyValue::Struct(read_struct(r, opts)?),
        "ArrayProperty" => PropertyValue::Array(read_array(r, data_size, opts)?),
        "MapProperty" => PropertyValue::Map(read_map(r, name, data_size)?),
        "SetProperty" => {
            let _inner = r.read_fstring()?;
            r.skip(1)?;
            r.skip(data_size)?;
            PropertyValue::Skipped
        }
        _ => {
            r.skip(1)?;
            r.skip(data_size)?;
            PropertyValue::Skipped
        }
    };

    Ok(Some(Property {
        name: name.to_string(),
        type_tag,
        value,
    }))
}

fn read_struct(r: &mut BinaryReader, opts: &ReadOptions) -> Result<StructValue, ReaderError> {
    let struct_type = r.read_fstring()?;
    r.skip(16)?; // struct guid, always zero in practice
    r.skip(1)?;
    read_struct_body(r, &struct_type, opts)
}

fn read_struct_body(
    r: &mut BinaryReader,
    struct_type: &str,
    opts: &ReadOptions,
) -> Result<StructValue, ReaderError> {
    Ok(match struct_type {
        "Vector" => StructValue::Vector {
            x: r.read_f32()? as f64,
            y: r.read_f32()? as f64,
            z: r.read_f32()? as f64,
        },
        "Rotator" => StructValue::Rotator {
            pitch: r.read_f32()? as f64,
            yaw: r.read_f32()? as f64,
            roll: r.read_f32()? as f64,
        },
        "Quat" => StructValue::Quat {
            x: r.read_f32()? as f64,
            y: r.read_f32()? as f64,
            z: r.read_f32()? as f64,
            w: r.read_f32()? as f64,
        },
        "Guid" => StructValue::Guid(r.read_guid()?),
        "LinearColor" => StructValue::LinearColor {
            r: r.read_f32()? as f64,
            g: r.read_f32()? as f64,
            b: r.read_f32()? as f64,
            a: r.read_f32()? as f64,
        },
        "DateTime" => StructValue::DateTime(r.read_i64()?),
        "Timespan" => StructValue::Timespan(r.read_i64()?),
        "Vector2D" => StructValue::Vector2D {
            x: r.read_f32()? as f64,
            y: r.read_f32()? as f64,
        },
        "GameplayTagContainer" => {
            let count = r.read_i32()?.max(0);
            let mut tags = Vec::with_capacity(count.min(4096) as usize);
            for _ in 0..count {
                tags.push(r.read_fstring()?);
            }
            StructValue::GameplayTags(tags)
        }
        "TimerHandle" | "SoftClassPath" | "SoftObjectPath" => {
            StructValue::Path(r.read_fstring()?)
        }
        "Transform" => StructValue::Transform(lift_transform(read_children(r, opts))),
        _ => StructValue::Generic {
            struct_type: struct_type.to_string(),
            children: read_children(r, opts),
        },
    })
}

/// Reads a nested property list up to its `None` terminator. A stuck child
/// also ends the list; the outer scan recovers from the resulting misframe.
fn read_children(r: &mut BinaryReader, opts: &ReadOptions) -> Vec<Property> {
    let mut children = Vec::new();
    while let Ok(Some(prop)) = read_property(r, opts) {
        children.push(prop);
    }
    children
}

fn lift_transform(children: Vec<Property>) -> Transform {
    let mut t = Transform::default();
    for c in children {
        match (clean_property_name(&c.name), c.value) {
            ("Translation", PropertyValue::Struct(StructValue::Vector { x, y, z })) => {
                t.translation = Some((x, y, z));
            }
            ("Rotation", PropertyValue::Struct(StructValue::Quat { x, y, z, w })) => {
                t.rotation = Some((x, y, z, w));
            }
            ("Scale3D", PropertyValue::Struct(StructValue::Vector { x, y, z })) => {
                t.scale = Some((x, y, z));
            }
            _ => {}
        }
    }
    t
}

fn read_array(
    r: &mut BinaryReader,
    data_size: usize,
    opts: &ReadOptions,
) -> Result<ArrayValue, ReaderError> {
    let inner_type = r.read_fstring()?;
    r.skip(1)?;
    let body_start = r.position();
    let count = r.read_i32()?.max(0) as usize;

    Ok(match inner_type.as_str() {
        "StructProperty" => {
            // per-array struct prologue
            let _elem_name = r.read_fstring()?;
            let _elem_type = r.read_fstring()?;
            let _elem_size = r.read_i64()?;
            let struct_type = r.read_fstring()?;
            r.skip(16)?;
            r.skip(1)?;

            if opts.skip_large_arrays
                && matches!(struct_type.as_str(), "Transform" | "Vector" | "Rotator")
                && count > opts.large_array_threshold
            {
                r.restore(body_start);
                r.skip(data_size)?;
                return Ok(ArrayValue::Skipped {
                    count: count as u32,
                });
            }

            match struct_type.as_str() {
                "S_Slots" => {
                    let mut slots = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        if let Some(slot) = lift_slot(&read_children(r, opts)) {
                            slots.push(slot);
                        }
                    }
                    ArrayValue::Slots(slots)
                }
                "Vector" | "Rotator" | "Quat" | "LinearColor" | "DateTime" | "Timespan"
                | "Vector2D" | "Guid" => {
                    let mut elements = Vec::with_capacity(count.min(65536));
                    for _ in 0..count {
                        elements.push(read_struct_body(r, &struct_type, opts)?);
                    }
                    ArrayValue::Structs {
                        struct_type,
                        elements,
                    }
                }
                _ => {
                    let mut elements = Vec::with_capacity(count.min(65536));
                    for _ in 0..count {
                        elements.push(StructValue::Generic {
                            struct_type: struct_type.clone(),
                            children: read_children(r, opts),
                        });
                    }
                    ArrayValue::Structs {
                        struct_type,
                        elements,
                    }
                }
            }
        }
        "NameProperty" | "StrProperty" | "ObjectProperty" | "SoftObjectProperty"
        | "EnumProperty" => {
            let mut values = Vec::with_capacity(count.min(65536));
            for _ in 0..count {
                values.push(r.read_fstring()?);
            }
            ArrayValue::Strings(values)
        }
        "IntProperty" => {
            let mut values = Vec::with_capacity(count.min(65536));
            for _ in 0..count {
                values.push(r.read_i32()? as i64);
            }
            ArrayValue::Ints(values)
        }
        "UInt32Property" => {
            let mut values = Vec::with_capacity(count.min(65536));
            for _ in 0..count {
                values.push(r.read_u32()? as i64);
            }
            ArrayValue::Ints(values)
        }
        "FloatProperty" => {
            let mut values = Vec::with_capacity(count.min(65536));
            for _ in 0..count {
                values.push(r.read_f32()? as f64);
            }
            ArrayValue::Floats(values)
        }
        "BoolProperty" => {
            let mut values = Vec::with_capacity(count.min(65536));
            for _ in 0..count {
                values.push(r.read_bool()?);
            }
            ArrayValue::Bools(values)
        }
        "ByteProperty" => ArrayValue::Bytes(r.read_bytes(count)?.to_vec()),
        _ => {
            r.restore(body_start);
            r.skip(data_size)?;
            ArrayValue::Unknown
        }
    })
}

fn lift_slot(children: &[Property]) -> Option<SlotItem> {
    let mut item: Option<String> = None;
    let mut amount = 1i64;
    let mut durability = 0.0f64;
    for c in children {
        match clean_property_name(&c.name) {
            "Item" => {
                if let PropertyValue::Struct(StructValue::Generic { children, .. }) = &c.value {
                    if let Some(row) = children
                        .iter()
                        .find(|p| clean_property_name(&p.name) == "RowName")
                    {
                        item = row.value.as_str().map(str::to_string);
                    }
                }
            }
            "RowName" => {
                if item.is_none() {
                    item = c.value.as_str().map(str::to_string);
                }
            }
            "Amount" => {
                if let Some(v) = c.value.as_i64() {
                    amount = v;
                }
            }
            "Durability" => {
                if let Some(v) = c.value.as_f64() {
                    durability = (v * 10.0).round() / 10.0;
                }
            }
            _ => {}
        }
    }
    item.filter(|i| !i.is_empty() && i != "None")
        .map(|item| SlotItem {
            item,
            amount,
            durability,
        })
}

fn is_primitive_map_type(ty: &str) -> bool {
    matches!(
        ty,
        "IntProperty"
            | "UInt32Property"
            | "Int64Property"
            | "FloatProperty"
            | "DoubleProperty"
            | "BoolProperty"
            | "StrProperty"
            | "NameProperty"
            | "EnumProperty"
    )
}

fn read_map_scalar(r: &mut BinaryReader, ty: &str) -> Result<MapScalar, ReaderError> {
    Ok(match ty {
        "IntProperty" => MapScalar::Int(r.read_i32()? as i64),
        "UInt32Property" => MapScalar::Int(r.read_u32()? as i64),
        "Int64Property" => MapScalar::Int(r.read_i64()?),
        "FloatProperty" => MapScalar::Float(r.read_f32()? as f64),
        "DoubleProperty" => MapScalar::Float(r.read_f64()?),
        "BoolProperty" => MapScalar::Bool(r.read_bool()?),
        _ => MapScalar::Str(r.read_fstring()?),
    })
}

fn read_map(
    r: &mut BinaryReader,
    name: &str,
    data_size: usize,
) -> Result<MapValue, ReaderError> {
    let key_type = r.read_fstring()?;
    let value_type = r.read_fstring()?;
    r.skip(1)?;
    let body_start = r.position();

    let captured = CAPTURED_MAPS.contains(&clean_property_name(name));
    if !captured || !is_primitive_map_type(&key_type) || !is_primitive_map_type(&value_type) {
        r.restore(body_start);
        r.skip(data_size)?;
        return Ok(MapValue::Skipped);
    }

    let _removed = r.read_i32()?;
    let count = r.read_i32()?.max(0) as usize;
    let mut entries = Vec::with_capacity(count.min(65536));
    for _ in 0..count {
        let key = read_map_scalar(r, &key_type)?;
        let value = read_map_scalar(r, &value_type)?;
        entries.push((key, value));
    }
    Ok(MapValue::Entries(entries))
}
