//! EDRM XML loadfile serialization.
//!
//! Element and attribute order is fixed so that identical loadfiles
//! serialize to identical bytes.

use std::borrow::Cow;
use std::io::Write;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::{ConvertError, Result};
use crate::model::document::{Document, ExternalFile, Loadfile, Relationship};

/// `DataInterchangeType` of every loadfile we write.
const DATA_INTERCHANGE_TYPE: &str = "Update";

/// Relationship type between a message and anything it contains.
const RELATIONSHIP_TYPE: &str = "Attachment";

const INDENT: usize = 2;

/// Serialize `loadfile` into `out`.
pub fn write_loadfile<W: Write>(loadfile: &Loadfile, out: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', INDENT);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(element(
        "Root",
        &[("DataInterchangeType", DATA_INTERCHANGE_TYPE)],
    )))?;
    writer.write_event(Event::Start(BytesStart::new("Batch")))?;

    write_documents(&mut writer, &loadfile.documents)?;
    write_relationships(&mut writer, &loadfile.relationships)?;

    writer.write_event(Event::End(BytesEnd::new("Batch")))?;
    writer.write_event(Event::End(BytesEnd::new("Root")))?;

    let mut out = writer.into_inner();
    out.write_all(b"\n")
        .and_then(|_| out.flush())
        .map_err(|e| ConvertError::Xml(e.into()))?;
    Ok(())
}

/// Serialize `loadfile` to a string.
pub fn serialize(loadfile: &Loadfile) -> Result<String> {
    let mut buf = Vec::new();
    write_loadfile(loadfile, &mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| ConvertError::Xml(quick_xml::Error::NonDecodable(Some(e.utf8_error()))))
}

fn write_documents<W: Write>(writer: &mut Writer<W>, documents: &[Document]) -> Result<()> {
    if documents.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("Documents")))?;
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new("Documents")))?;
    for doc in documents {
        let doc_id = doc.doc_id.to_string();
        let mut attrs = vec![("DocID", doc_id.as_str()), ("DocType", doc.doc_type.as_str())];
        if let Some(mime) = &doc.mime_type {
            attrs.push(("MimeType", mime.as_str()));
        }
        writer.write_event(Event::Start(element("Document", &attrs)))?;

        if doc.tags.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new("Tags")))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new("Tags")))?;
            for tag in &doc.tags {
                writer.write_event(Event::Empty(element(
                    "Tag",
                    &[
                        ("TagName", tag.name.as_str()),
                        ("TagValue", tag.value.as_str()),
                        ("TagDataType", tag.data_type.as_str()),
                    ],
                )))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Tags")))?;
        }

        if let Some(native) = &doc.native {
            write_native(writer, native)?;
        }

        writer.write_event(Event::End(BytesEnd::new("Document")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Documents")))?;
    Ok(())
}

fn write_native<W: Write>(writer: &mut Writer<W>, native: &ExternalFile) -> Result<()> {
    let size = native.file_size.to_string();
    writer.write_event(Event::Start(BytesStart::new("Files")))?;
    writer.write_event(Event::Start(element(
        "File",
        &[("FileType", native.file_type.as_str())],
    )))?;
    writer.write_event(Event::Empty(element(
        "ExternalFile",
        &[
            ("FilePath", native.file_path.as_str()),
            ("FileName", native.file_name.as_str()),
            ("FileSize", size.as_str()),
            ("Hash", native.hash.as_str()),
        ],
    )))?;
    writer.write_event(Event::End(BytesEnd::new("File")))?;
    writer.write_event(Event::End(BytesEnd::new("Files")))?;
    Ok(())
}

fn write_relationships<W: Write>(
    writer: &mut Writer<W>,
    relationships: &[Relationship],
) -> Result<()> {
    if relationships.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("Relationships")))?;
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new("Relationships")))?;
    for rel in relationships {
        let parent = rel.parent.to_string();
        let child = rel.child.to_string();
        writer.write_event(Event::Empty(element(
            "Relationship",
            &[
                ("Type", RELATIONSHIP_TYPE),
                ("ParentDocID", parent.as_str()),
                ("ChildDocID", child.as_str()),
            ],
        )))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    Ok(())
}

/// Start tag with attributes in the given order, values escaped.
fn element<'a>(name: &'a str, attrs: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        let escaped = escape_attribute(value);
        // Already escaped; the tuple-of-bytes conversion writes it verbatim.
        start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
    }
    start
}

/// Escape markup characters, plus whitespace that attribute-value
/// normalization would otherwise turn into plain spaces.
fn escape_attribute(value: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(value);
    if !escaped.contains(['\t', '\n', '\r']) {
        return escaped;
    }
    let mut out = String::with_capacity(escaped.len() + 16);
    for c in escaped.chars() {
        match c {
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
