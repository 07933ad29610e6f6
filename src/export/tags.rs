//! Property → EDRM tag mapping.

use chrono::SecondsFormat;
use thiserror::Error;
use tracing::warn;

use crate::model::document::{Tag, TagDataType};
use crate::model::item::{Property, PropertyValue};

/// Text longer than this many characters is typed `LongText`.
const LONG_TEXT_THRESHOLD: usize = 255;

/// Separator between the items of a multi-valued property.
const LIST_SEPARATOR: &str = "; ";

/// Why a property could not become a tag.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    #[error("property has an empty name")]
    EmptyName,

    #[error("property '{0}' has a non-finite numeric value")]
    NonFinite(String),

    #[error("property '{name}' contains character U+{code:04X}, which XML 1.0 cannot represent")]
    InvalidCharacter { name: String, code: u32 },
}

/// Map one property to a tag.
///
/// The name is copied verbatim. The value is rendered to text and the
/// declared type mapped onto an EDRM data type; unrecognized types fall
/// back to `Text` and are logged.
pub fn map_property(property: &Property) -> Result<Tag, TagError> {
    if property.name.is_empty() {
        return Err(TagError::EmptyName);
    }

    let (value, data_type) = match &property.value {
        PropertyValue::Text(s) => (s.clone(), text_type(s)),
        PropertyValue::TextList(items) => {
            let joined = items.join(LIST_SEPARATOR);
            let data_type = text_type(&joined);
            (joined, data_type)
        }
        PropertyValue::Integer(n) => (n.to_string(), TagDataType::Integer),
        PropertyValue::Decimal(x) => {
            if !x.is_finite() {
                return Err(TagError::NonFinite(property.name.clone()));
            }
            (x.to_string(), TagDataType::Decimal)
        }
        PropertyValue::Boolean(b) => (b.to_string(), TagDataType::Boolean),
        PropertyValue::DateTime(dt) => (
            dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            TagDataType::DateTime,
        ),
        PropertyValue::Binary(bytes) => (to_hex(bytes), TagDataType::Text),
        PropertyValue::Unrecognized { type_tag, raw } => {
            warn!(
                property = %property.name,
                type_tag = %type_tag,
                "Unrecognized property type, exporting as Text"
            );
            (raw.clone(), text_type(raw))
        }
    };

    if let Some(c) = value.chars().find(|&c| !is_xml_char(c)) {
        return Err(TagError::InvalidCharacter {
            name: property.name.clone(),
            code: c as u32,
        });
    }

    Ok(Tag {
        name: property.name.clone(),
        value,
        data_type,
    })
}

fn text_type(s: &str) -> TagDataType {
    if s.chars().count() > LONG_TEXT_THRESHOLD {
        TagDataType::LongText
    } else {
        TagDataType::Text
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn map(name: &str, value: PropertyValue) -> Result<Tag, TagError> {
        map_property(&Property::new(name, value))
    }

    #[test]
    fn test_text_keeps_name_verbatim() {
        let tag = map("#Subject", PropertyValue::Text("Here is a sample message".into())).unwrap();
        assert_eq!(tag.name, "#Subject");
        assert_eq!(tag.value, "Here is a sample message");
        assert_eq!(tag.data_type, TagDataType::Text);
    }

    #[test]
    fn test_long_text() {
        let tag = map("#Header", PropertyValue::Text("x".repeat(300))).unwrap();
        assert_eq!(tag.data_type, TagDataType::LongText);
    }

    #[test]
    fn test_text_list_is_joined() {
        let tag = map(
            "#To",
            PropertyValue::TextList(vec!["a@example.com".into(), "B <b@example.com>".into()]),
        )
        .unwrap();
        assert_eq!(tag.value, "a@example.com; B <b@example.com>");
        assert_eq!(tag.data_type, TagDataType::Text);
    }

    #[test]
    fn test_scalar_types() {
        let n = map("#AttachmentCount", PropertyValue::Integer(3)).unwrap();
        assert_eq!((n.value.as_str(), n.data_type), ("3", TagDataType::Integer));

        let b = map("#HasAttachments", PropertyValue::Boolean(false)).unwrap();
        assert_eq!((b.value.as_str(), b.data_type), ("false", TagDataType::Boolean));

        let d = map("#Score", PropertyValue::Decimal(0.5)).unwrap();
        assert_eq!((d.value.as_str(), d.data_type), ("0.5", TagDataType::Decimal));
    }

    #[test]
    fn test_datetime_rendering() {
        let dt = Utc.with_ymd_and_hms(2010, 6, 24, 19, 16, 17).unwrap();
        let tag = map("#DateSent", PropertyValue::DateTime(dt)).unwrap();
        assert_eq!(tag.value, "2010-06-24T19:16:17Z");
        assert_eq!(tag.data_type, TagDataType::DateTime);
    }

    #[test]
    fn test_binary_is_hex() {
        let tag = map("#EntryID", PropertyValue::Binary(vec![0x00, 0xab, 0x10])).unwrap();
        assert_eq!(tag.value, "00ab10");
        assert_eq!(tag.data_type, TagDataType::Text);
    }

    #[test]
    fn test_unrecognized_falls_back_to_text() {
        let tag = map(
            "#Custom",
            PropertyValue::Unrecognized {
                type_tag: "x-currency".into(),
                raw: "12.00 EUR".into(),
            },
        )
        .unwrap();
        assert_eq!(tag.value, "12.00 EUR");
        assert_eq!(tag.data_type, TagDataType::Text);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            map("", PropertyValue::Integer(1)).unwrap_err(),
            TagError::EmptyName
        );
        assert!(matches!(
            map("#X", PropertyValue::Decimal(f64::NAN)),
            Err(TagError::NonFinite(_))
        ));
        assert_eq!(
            map("#Subject", PropertyValue::Text("bad\u{0}byte".into())).unwrap_err(),
            TagError::InvalidCharacter {
                name: "#Subject".into(),
                code: 0
            }
        );
    }

    #[test]
    fn test_deterministic() {
        let p = Property::text("#Subject", "same");
        assert_eq!(map_property(&p), map_property(&p));
    }
}
