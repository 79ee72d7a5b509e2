use std::collections::BTreeMap;

use dicom::core::dictionary::DataDictionary;
use dicom::core::value::Value;
use dicom::core::{PrimitiveValue, Tag};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;

use crate::dataset::AttributeValue;

const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// Attribute name for a tag: the standard keyword, or `(GGGG,EEEE)` for private/unknown tags.
pub fn tag_key(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|e| e.alias.to_string())
        .unwrap_or_else(|| format_tag(tag))
}

pub fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// Convert one primitive value; empty values are treated as missing.
pub fn attribute_value(value: &PrimitiveValue) -> Option<AttributeValue> {
    match value {
        PrimitiveValue::Empty => None,
        PrimitiveValue::U8(bytes) => Some(AttributeValue::Bytes(bytes.to_vec())),
        PrimitiveValue::I16(_)
        | PrimitiveValue::U16(_)
        | PrimitiveValue::I32(_)
        | PrimitiveValue::U32(_)
        | PrimitiveValue::I64(_)
        | PrimitiveValue::U64(_)
        | PrimitiveValue::F32(_)
        | PrimitiveValue::F64(_) => value.to_multi_float64().ok().map(AttributeValue::Numbers),
        _ => {
            let text = value.to_str();
            let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            (!trimmed.is_empty()).then(|| AttributeValue::Text(trimmed.to_string()))
        }
    }
}

/// Flatten the top-level primitive elements of an object into named attributes.
/// Sequences and the pixel data element are skipped.
pub fn collect_attributes(
    obj: &InMemDicomObject<StandardDataDictionary>,
) -> BTreeMap<String, AttributeValue> {
    let mut attributes = BTreeMap::new();
    for elem in obj.iter() {
        let tag = elem.header().tag;
        if tag == PIXEL_DATA {
            continue;
        }
        if let Value::Primitive(p) = elem.value() {
            if let Some(value) = attribute_value(p) {
                attributes.insert(tag_key(tag), value);
            }
        }
    }
    attributes
}
