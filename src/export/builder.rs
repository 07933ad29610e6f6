//! Turn mail items into loadfile documents.

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::export::native::NativeExporter;
use crate::export::tags::map_property;
use crate::model::document::{DocId, DocType, Document, Tag};
use crate::model::item::{Attachment, MailItem, Message, Property};

/// MIME type recorded for message documents.
pub const MESSAGE_MIME_TYPE: &str = "message/rfc822";

/// Builds one [`Document`] per item, exporting attachment natives as it goes.
#[derive(Debug)]
pub struct DocumentBuilder {
    exporter: NativeExporter,
    natives_written: u64,
    bytes_written: u64,
}

impl DocumentBuilder {
    pub fn new(exporter: NativeExporter) -> Self {
        Self {
            exporter,
            natives_written: 0,
            bytes_written: 0,
        }
    }

    pub fn build(&mut self, item: &MailItem, doc_id: DocId) -> Result<Document> {
        match item {
            MailItem::Message(message) => Ok(self.build_message(message, doc_id)),
            MailItem::Attachment(attachment) => self.build_attachment(attachment, doc_id),
        }
    }

    pub fn build_message(&mut self, message: &Message, doc_id: DocId) -> Document {
        Document {
            doc_id,
            doc_type: DocType::Message,
            mime_type: Some(MESSAGE_MIME_TYPE.to_string()),
            tags: map_tags(&message.properties, doc_id),
            native: None,
            native_error: None,
        }
    }

    /// Map tags and export the native.
    ///
    /// An attachment whose content cannot be read keeps its document, without
    /// a native, and records why in `native_error`. Failing to write into the
    /// output directory is returned as an error.
    pub fn build_attachment(&mut self, attachment: &Attachment, doc_id: DocId) -> Result<Document> {
        let tags = map_tags(&attachment.properties, doc_id);
        let (native, native_error) = match self.exporter.export(attachment, doc_id) {
            Ok(file) => {
                self.natives_written += 1;
                self.bytes_written += file.file_size;
                (Some(file), None)
            }
            Err(e @ ConvertError::Io { .. }) => return Err(e),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(Document {
            doc_id,
            doc_type: DocType::File,
            mime_type: attachment.content_type.clone(),
            tags,
            native,
            native_error,
        })
    }

    /// Number of native files written so far.
    pub fn natives_written(&self) -> u64 {
        self.natives_written
    }

    /// Total size of the native files written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

fn map_tags(properties: &[Property], doc_id: DocId) -> Vec<Tag> {
    let tags: Vec<Tag> = properties
        .iter()
        .filter_map(|p| match map_property(p) {
            Ok(tag) => Some(tag),
            Err(e) => {
                warn!(
                    doc_id = %doc_id,
                    property = %p.name,
                    value_type = p.value.type_name(),
                    error = %e,
                    "Omitting tag"
                );
                None
            }
        })
        .collect();
    debug!(doc_id = %doc_id, tags = tags.len(), "Mapped tags");
    tags
}
