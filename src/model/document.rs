//! Exported loadfile types: documents, tags, native files and relationships.

use serde::Serialize;

/// Width of the numeric part of a document identifier.
const DOC_ID_WIDTH: usize = 7;

/// Document identifier, rendered as `d` + zero-padded sequence (`d0000001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct DocId(u32);

impl DocId {
    pub fn sequence(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "d{:0width$}", self.0, width = DOC_ID_WIDTH)
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> Self {
        id.to_string()
    }
}

/// Hands out document identifiers in strictly increasing order, starting at 1.
///
/// One sequence belongs to one conversion; it is passed through the
/// traversal rather than shared.
#[derive(Debug, Default)]
pub struct DocIdSequence {
    last: u32,
}

impl DocIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> DocId {
        self.last += 1;
        DocId(self.last)
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u32 {
        self.last
    }
}

/// EDRM document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocType {
    Message,
    File,
}

impl DocType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "Message",
            Self::File => "File",
        }
    }
}

/// EDRM tag data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TagDataType {
    Text,
    LongText,
    Integer,
    Decimal,
    DateTime,
    Boolean,
}

impl TagDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::LongText => "LongText",
            Self::Integer => "Integer",
            Self::Decimal => "Decimal",
            Self::DateTime => "DateTime",
            Self::Boolean => "Boolean",
        }
    }
}

/// One metadata field of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
    pub data_type: TagDataType,
}

/// Kind of file representation. Only byte-for-byte natives are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileType {
    Native,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "Native",
        }
    }
}

/// An attachment written to the output directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalFile {
    /// Name of the file on disk.
    pub file_name: String,
    /// Subdirectory inside the output directory (empty for the root).
    pub file_path: String,
    /// Number of bytes written.
    pub file_size: u64,
    /// Hex digest of exactly the bytes written.
    pub hash: String,
    pub file_type: FileType,
}

/// One exported unit: a message or an attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub doc_id: DocId,
    pub doc_type: DocType,
    pub mime_type: Option<String>,
    pub tags: Vec<Tag>,
    pub native: Option<ExternalFile>,
    /// Why the native file is missing, when export was attempted and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_error: Option<String>,
}

impl Document {
    /// Value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}

/// Parent → child link between two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub parent: DocId,
    pub child: DocId,
}

/// A subtree or native file that could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionFailure {
    /// Where in the archive the failure happened.
    pub location: String,
    /// Document that would have owned the missing item, if any.
    pub parent: Option<DocId>,
    pub reason: String,
}

/// The aggregate produced by one traversal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Loadfile {
    pub documents: Vec<Document>,
    pub relationships: Vec<Relationship>,
    pub failures: Vec<ExtractionFailure>,
}

impl Loadfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        // Ids are dense and assigned in push order.
        let idx = (id.sequence() as usize).checked_sub(1)?;
        self.documents.get(idx).filter(|d| d.doc_id == id)
    }

    pub fn parent_of(&self, id: DocId) -> Option<DocId> {
        self.relationships
            .iter()
            .find(|r| r.child == id)
            .map(|r| r.parent)
    }

    pub fn count_of(&self, doc_type: DocType) -> usize {
        self.documents
            .iter()
            .filter(|d| d.doc_type == doc_type)
            .count()
    }
}
