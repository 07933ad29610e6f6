//! Mail-store items: messages, attachments and their typed properties.
//!
//! These are what an archive reader hands to the traversal engine. Folders
//! are not items; they are store-specific handles (see [`crate::store`]).

use std::io::Read;

use chrono::{DateTime, Utc};

/// A typed property value. The variant is the source's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    TextList(Vec<String>),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
    /// A value whose source type the reader could not classify.
    Unrecognized { type_tag: String, raw: String },
}

impl PropertyValue {
    /// Short name of the declared type, for diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::TextList(_) => "text-list",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Binary(_) => "binary",
            Self::Unrecognized { type_tag, .. } => type_tag,
        }
    }
}

/// One named property of a mail item, e.g. `#Subject`.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Text(value.into()))
    }
}

/// A child the reader failed to produce. The rest of the tree is still usable.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    /// Human-readable position of the child, e.g. `part 2`.
    pub location: String,
    pub reason: String,
}

impl ItemError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

/// A child slot of a message, in source order.
pub type ChildItem = std::result::Result<MailItem, ItemError>;

/// A node of a message subtree.
#[derive(Debug, Clone)]
pub enum MailItem {
    Message(Message),
    Attachment(Attachment),
}

/// A message with its properties and exclusively owned children.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub properties: Vec<Property>,
    pub children: Vec<ChildItem>,
}

impl Message {
    pub fn new(properties: Vec<Property>) -> Self {
        Self {
            properties,
            children: Vec::new(),
        }
    }

    /// Append an embedded sub-message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.children.push(Ok(MailItem::Message(message)));
        self
    }

    /// Append a plain-file attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.children.push(Ok(MailItem::Attachment(attachment)));
        self
    }

    /// First text value of the property `name`, if any.
    pub fn text_property(&self, name: &str) -> Option<&str> {
        self.properties.iter().find_map(|p| match &p.value {
            PropertyValue::Text(s) if p.name == name => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Where an attachment's bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentData {
    /// Fully decoded content.
    Bytes(Vec<u8>),
    /// The reader knows the attachment exists but cannot produce its content.
    Unavailable(String),
}

/// A plain-file attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename suggested by the source (used for tags and the extension).
    pub filename: String,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: Option<String>,
    pub properties: Vec<Property>,
    pub data: AttachmentData,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, properties: Vec<Property>, data: AttachmentData) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            properties,
            data,
        }
    }

    /// Open the attachment's byte stream.
    pub fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        match &self.data {
            AttachmentData::Bytes(bytes) => Ok(Box::new(bytes.as_slice())),
            AttachmentData::Unavailable(reason) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                reason.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_open_reads_bytes() {
        let att = Attachment::new("a.txt", Vec::new(), AttachmentData::Bytes(b"abc".to_vec()));
        let mut buf = Vec::new();
        att.open().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");
    }

    #[test]
    fn test_unavailable_attachment_fails_to_open() {
        let att = Attachment::new(
            "a.txt",
            Vec::new(),
            AttachmentData::Unavailable("bad base64".into()),
        );
        let err = att.open().err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("bad base64"));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(PropertyValue::Integer(3).type_name(), "integer");
        assert_eq!(PropertyValue::TextList(Vec::new()).type_name(), "text-list");
        let odd = PropertyValue::Unrecognized {
            type_tag: "PT_SVREID".to_string(),
            raw: "00ff".to_string(),
        };
        assert_eq!(odd.type_name(), "PT_SVREID");
    }

    #[test]
    fn test_text_property_lookup() {
        let msg = Message::new(vec![
            Property::new("#AttachmentCount", PropertyValue::Integer(0)),
            Property::text("#Subject", "Hi"),
        ]);
        assert_eq!(msg.text_property("#Subject"), Some("Hi"));
        assert_eq!(msg.text_property("#AttachmentCount"), None);
    }
}
