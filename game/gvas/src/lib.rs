pub mod header;
pub mod property;
pub mod types;

pub use header::{read_header, GvasHeader};
pub use property::{clean_property_name, read_property, ReadOptions};
pub use types::{
    ArrayValue, ByteValue, GvasError, MapScalar, MapValue, Property, PropertyValue, SlotItem,
    StructValue, Transform,
};
