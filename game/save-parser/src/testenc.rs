//! Binary fixture encoders for parser tests.

pub fn fstring(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if s.is_empty() {
        out.extend(0i32.to_le_bytes());
    } else {
        out.extend(((s.len() + 1) as i32).to_le_bytes());
        out.extend(s.as_bytes());
        out.push(0);
    }
    out
}

pub fn gvas_header() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(b"GVAS");
    out.extend(2u32.to_le_bytes());
    out.extend(522u32.to_le_bytes());
    out.extend(4u16.to_le_bytes());
    out.extend(27u16.to_le_bytes());
    out.extend(2u16.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend(fstring("++UE4+Release-4.27"));
    out.extend(3u32.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend(fstring("TSWGameSave_C"));
    out
}

pub fn none() -> Vec<u8> {
    fstring("None")
}

pub fn prop_header(name: &str, type_tag: &str, data_size: i64) -> Vec<u8> {
    let mut out = fstring(name);
    out.extend(fstring(type_tag));
    out.extend(data_size.to_le_bytes());
    out
}

pub fn int_prop(name: &str, v: i32) -> Vec<u8> {
    let mut out = prop_header(name, "IntProperty", 4);
    out.push(0);
    out.extend(v.to_le_bytes());
    out
}

pub fn float_prop(name: &str, v: f32) -> Vec<u8> {
    let mut out = prop_header(name, "FloatProperty", 4);
    out.push(0);
    out.extend(v.to_le_bytes());
    out
}

pub fn bool_prop(name: &str, v: bool) -> Vec<u8> {
    let mut out = prop_header(name, "BoolProperty", 0);
    out.push(v as u8);
    out.push(0);
    out
}

pub fn str_prop(name: &str, v: &str) -> Vec<u8> {
    let body = fstring(v);
    let mut out = prop_header(name, "StrProperty", body.len() as i64);
    out.push(0);
    out.extend(body);
    out
}

pub fn name_prop(name: &str, v: &str) -> Vec<u8> {
    let body = fstring(v);
    let mut out = prop_header(name, "NameProperty", body.len() as i64);
    out.push(0);
    out.extend(body);
    out
}

pub fn enum_prop(name: &str, enum_type: &str, v: &str) -> Vec<u8> {
    let body = fstring(v);
    let mut out = prop_header(name, "EnumProperty", body.len() as i64);
    out.extend(fstring(enum_type));
    out.push(0);
    out.extend(body);
    out
}

pub fn byte_enum_prop(name: &str, enum_name: &str, v: &str) -> Vec<u8> {
    let body = fstring(v);
    let mut out = prop_header(name, "ByteProperty", body.len() as i64);
    out.extend(fstring(enum_name));
    out.push(0);
    out.extend(body);
    out
}

pub fn byte_raw_prop(name: &str, v: u8) -> Vec<u8> {
    let mut out = prop_header(name, "ByteProperty", 1);
    out.extend(fstring("None"));
    out.push(0);
    out.push(v);
    out
}

fn vector_child(name: &str, x: f32, y: f32, z: f32) -> Vec<u8> {
    let mut out = prop_header(name, "StructProperty", 12);
    out.extend(fstring("Vector"));
    out.extend([0u8; 16]);
    out.push(0);
    out.extend(x.to_le_bytes());
    out.extend(y.to_le_bytes());
    out.extend(z.to_le_bytes());
    out
}

fn quat_child(name: &str, q: [f32; 4]) -> Vec<u8> {
    let mut out = prop_header(name, "StructProperty", 16);
    out.extend(fstring("Quat"));
    out.extend([0u8; 16]);
    out.push(0);
    for v in q {
        out.extend(v.to_le_bytes());
    }
    out
}

pub fn transform_prop(name: &str, pos: (f32, f32, f32), quat: [f32; 4]) -> Vec<u8> {
    let mut body = vector_child("Translation", pos.0, pos.1, pos.2);
    body.extend(quat_child("Rotation", quat));
    body.extend(vector_child("Scale3D", 1.0, 1.0, 1.0));
    body.extend(none());
    let mut out = prop_header(name, "StructProperty", body.len() as i64);
    out.extend(fstring("Transform"));
    out.extend([0u8; 16]);
    out.push(0);
    out.extend(body);
    out
}

pub fn string_array(name: &str, inner: &str, values: &[&str]) -> Vec<u8> {
    let mut body = (values.len() as i32).to_le_bytes().to_vec();
    for v in values {
        body.extend(fstring(v));
    }
    array_prop(name, inner, body)
}

pub fn float_array(name: &str, values: &[f32]) -> Vec<u8> {
    let mut body = (values.len() as i32).to_le_bytes().to_vec();
    for v in values {
        body.extend(v.to_le_bytes());
    }
    array_prop(name, "FloatProperty", body)
}

pub fn int_array(name: &str, values: &[i32]) -> Vec<u8> {
    let mut body = (values.len() as i32).to_le_bytes().to_vec();
    for v in values {
        body.extend(v.to_le_bytes());
    }
    array_prop(name, "IntProperty", body)
}

pub fn bool_array(name: &str, values: &[bool]) -> Vec<u8> {
    let mut body = (values.len() as i32).to_le_bytes().to_vec();
    for v in values {
        body.push(*v as u8);
    }
    array_prop(name, "BoolProperty", body)
}

fn array_prop(name: &str, inner: &str, body: Vec<u8>) -> Vec<u8> {
    let mut out = prop_header(name, "ArrayProperty", body.len() as i64);
    out.extend(fstring(inner));
    out.push(0);
    out.extend(body);
    out
}

/// Array of generic struct elements; each element is a child property list
/// terminated by `None`.
pub fn generic_struct_array(name: &str, struct_type: &str, elements: &[Vec<u8>]) -> Vec<u8> {
    let elements: Vec<Vec<u8>> = elements
        .iter()
        .map(|e| {
            let mut with_term = e.clone();
            with_term.extend(none());
            with_term
        })
        .collect();
    let elements_len: usize = elements.iter().map(|e| e.len()).sum();

    let mut body = (elements.len() as i32).to_le_bytes().to_vec();
    body.extend(fstring(name));
    body.extend(fstring("StructProperty"));
    body.extend((elements_len as i64).to_le_bytes());
    body.extend(fstring(struct_type));
    body.extend([0u8; 16]);
    body.push(0);
    for e in &elements {
        body.extend(e);
    }
    array_prop(name, "StructProperty", body)
}

pub fn vector_struct_array(name: &str, vectors: &[(f32, f32, f32)]) -> Vec<u8> {
    let mut body = (vectors.len() as i32).to_le_bytes().to_vec();
    body.extend(fstring(name));
    body.extend(fstring("StructProperty"));
    body.extend((vectors.len() as i64 * 12).to_le_bytes());
    body.extend(fstring("Vector"));
    body.extend([0u8; 16]);
    body.push(0);
    for (x, y, z) in vectors {
        body.extend(x.to_le_bytes());
        body.extend(y.to_le_bytes());
        body.extend(z.to_le_bytes());
    }
    array_prop(name, "StructProperty", body)
}

/// One `S_Slots` element body (without terminator).
pub fn slot_element(item: &str, amount: i32, durability: f32) -> Vec<u8> {
    let mut item_body = name_prop("RowName", item);
    item_body.extend(none());
    let mut out = prop_header("Item", "StructProperty", item_body.len() as i64);
    out.extend(fstring("S_ItemRow"));
    out.extend([0u8; 16]);
    out.push(0);
    out.extend(item_body);
    out.extend(int_prop("Amount", amount));
    out.extend(float_prop("Durability", durability));
    out
}

pub fn slots_array(name: &str, slots: &[Vec<u8>]) -> Vec<u8> {
    generic_struct_array(name, "S_Slots", slots)
}

pub fn str_int_map(name: &str, pairs: &[(&str, i32)]) -> Vec<u8> {
    let mut body = 0i32.to_le_bytes().to_vec();
    body.extend((pairs.len() as i32).to_le_bytes());
    for (k, v) in pairs {
        body.extend(fstring(k));
        body.extend(v.to_le_bytes());
    }
    let mut out = prop_header(name, "MapProperty", body.len() as i64);
    out.extend(fstring("StrProperty"));
    out.extend(fstring("IntProperty"));
    out.push(0);
    out.extend(body);
    out
}

pub fn str_float_map(name: &str, pairs: &[(&str, f32)]) -> Vec<u8> {
    let mut body = 0i32.to_le_bytes().to_vec();
    body.extend((pairs.len() as i32).to_le_bytes());
    for (k, v) in pairs {
        body.extend(fstring(k));
        body.extend(v.to_le_bytes());
    }
    let mut out = prop_header(name, "MapProperty", body.len() as i64);
    out.extend(fstring("StrProperty"));
    out.extend(fstring("FloatProperty"));
    out.push(0);
    out.extend(body);
    out
}
