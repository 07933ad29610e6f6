//! MIME message parsing: turns one raw message into a [`Message`] item tree.
//!
//! Embedded `message/rfc822` parts become sub-messages; every other
//! attachment becomes a plain-file [`Attachment`] with its decoded bytes.

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{ConvertError, Result};
use crate::model::address::EmailAddress;
use crate::model::item::{
    Attachment, AttachmentData, ChildItem, ItemError, MailItem, Message, Property, PropertyValue,
};
use crate::parser::header;

/// A parsed message whose children are not assembled yet.
struct Pending {
    properties: Vec<Property>,
    slots: Vec<Slot>,
}

enum Slot {
    Ready(ChildItem),
    /// Index of an embedded message in the pending arena.
    Embedded(usize),
}

/// Parse one raw message (without its mbox separator line).
///
/// `received` is the delivery date known from outside the message, e.g. the
/// mbox separator line. `location` names the message in errors.
///
/// Nesting depth is unbounded: embedded messages are collected with an
/// explicit work list and assembled bottom-up, not by recursion.
pub fn parse_message(
    bytes: &[u8],
    received: Option<DateTime<Utc>>,
    location: &str,
) -> Result<Message> {
    let root = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| ConvertError::Extraction {
            location: location.to_string(),
            reason: "message could not be parsed as RFC 5322".to_string(),
        })?;

    let mut pending: Vec<Option<Pending>> = vec![None];
    let mut work: Vec<(&mail_parser::Message<'_>, usize, Option<DateTime<Utc>>)> =
        vec![(&root, 0, received)];

    while let Some((msg, idx, received)) = work.pop() {
        let mut slots = Vec::new();
        for (n, part) in msg.attachments().enumerate() {
            match &part.body {
                PartType::Message(sub) => {
                    let child = pending.len();
                    pending.push(None);
                    slots.push(Slot::Embedded(child));
                    work.push((sub, child, None));
                }
                _ if is_message_part(part) => {
                    slots.push(Slot::Ready(Err(ItemError::new(
                        format!("part {}", n + 1),
                        "embedded message could not be parsed",
                    ))));
                }
                _ => {
                    let attachment = attachment_from_part(part, n);
                    slots.push(Slot::Ready(Ok(MailItem::Attachment(attachment))));
                }
            }
        }
        pending[idx] = Some(Pending {
            properties: message_properties(msg, received),
            slots,
        });
    }

    // Embedded messages always sit at higher indices than their parent.
    let mut built: Vec<Option<Message>> = (0..pending.len()).map(|_| None).collect();
    for idx in (0..pending.len()).rev() {
        let Some(p) = pending[idx].take() else {
            continue;
        };
        let children = p
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(child) => child,
                Slot::Embedded(i) => built[i]
                    .take()
                    .map(MailItem::Message)
                    .ok_or_else(|| ItemError::new(format!("embedded message {i}"), "missing")),
            })
            .collect();
        built[idx] = Some(Message {
            properties: p.properties,
            children,
        });
    }

    built[0].take().ok_or_else(|| ConvertError::Extraction {
        location: location.to_string(),
        reason: "message tree could not be assembled".to_string(),
    })
}

/// Properties of one message, in export order.
fn message_properties(
    msg: &mail_parser::Message<'_>,
    received: Option<DateTime<Utc>>,
) -> Vec<Property> {
    let mut props = Vec::new();

    let header_text = header::decode_header_bytes(header::header_block(msg.raw_message()));
    let headers = header::unfold_headers(&header_text);

    for (name, addresses) in [
        ("#From", msg.from()),
        ("#To", msg.to()),
        ("#CC", msg.cc()),
        ("#BCC", msg.bcc()),
    ] {
        let rendered: Vec<String> = addresses
            .map(EmailAddress::list_from)
            .unwrap_or_default()
            .iter()
            .map(EmailAddress::display)
            .collect();
        if !rendered.is_empty() {
            props.push(Property::new(name, PropertyValue::TextList(rendered)));
        }
    }

    if let Some(subject) = msg.subject() {
        props.push(Property::text("#Subject", subject));
    }

    if !header_text.trim().is_empty() {
        props.push(Property::text("#Header", header_text.trim_end()));
    }

    if let Some(sent) = msg
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
    {
        props.push(Property::new("#DateSent", PropertyValue::DateTime(sent)));
    }

    if let Some(received) = received {
        props.push(Property::new(
            "#DateReceived",
            PropertyValue::DateTime(received),
        ));
    }

    let names: Vec<String> = msg
        .attachments()
        .enumerate()
        .map(|(n, part)| match &part.body {
            PartType::Message(sub) => sub.subject().unwrap_or("(no subject)").to_string(),
            _ => attachment_filename(part, n),
        })
        .collect();
    props.push(Property::new(
        "#HasAttachments",
        PropertyValue::Boolean(!names.is_empty()),
    ));
    props.push(Property::new(
        "#AttachmentCount",
        PropertyValue::Integer(names.len() as i64),
    ));
    if !names.is_empty() {
        props.push(Property::new(
            "#AttachmentNames",
            PropertyValue::TextList(names),
        ));
    }

    if let Some(read) = header::read_flag(&headers) {
        props.push(Property::new("#ReadFlag", PropertyValue::Boolean(read)));
    }
    if let Some(important) = header::importance_flag(&headers) {
        props.push(Property::new(
            "#ImportanceFlag",
            PropertyValue::Boolean(important),
        ));
    }

    if let Some(id) = msg.message_id() {
        props.push(Property::text("#MessageID", format!("<{id}>")));
    }
    if let Some(in_reply_to) = header::get_header(&headers, "in-reply-to") {
        props.push(Property::text("#InReplyTo", in_reply_to));
    }

    props
}

/// Build a plain-file attachment from a decoded MIME part.
fn attachment_from_part(part: &MessagePart<'_>, index: usize) -> Attachment {
    let filename = attachment_filename(part, index);
    let extension = file_extension(&filename).unwrap_or_default().to_string();
    let contents = part.contents();

    let mut properties = vec![
        Property::text("#FileName", filename.clone()),
        Property::text("#FileExtension", extension),
    ];

    // Undecodable content has no meaningful size.
    let data = if part.is_encoding_problem {
        AttachmentData::Unavailable("attachment content could not be decoded".to_string())
    } else {
        properties.push(Property::new(
            "#FileSize",
            PropertyValue::Integer(contents.len() as i64),
        ));
        AttachmentData::Bytes(contents.to_vec())
    };

    let mut attachment = Attachment::new(filename, properties, data);
    attachment.content_type = Some(content_type(part));
    attachment
}

/// Filename of an attachment part. Generated if missing from the headers.
fn attachment_filename(part: &MessagePart<'_>, index: usize) -> String {
    part.attachment_name()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("attachment_{index}"))
}

/// Text after the last `.` of a filename, if any.
pub fn file_extension(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

fn content_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
        .to_lowercase()
}

/// Whether a part declares itself an embedded message.
fn is_message_part(part: &MessagePart<'_>) -> bool {
    part.content_type().is_some_and(|ct| {
        ct.ctype().eq_ignore_ascii_case("message")
            && ct
                .subtype()
                .is_some_and(|s| s.eq_ignore_ascii_case("rfc822") || s.eq_ignore_ascii_case("global"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: John Doe <john@example.com>\r\n\
To: Jane Doe <jane@example.com>, bob@example.com\r\n\
Subject: Here is a sample message\r\n\
Date: Thu, 24 Jun 2010 19:16:17 +0000\r\n\
Message-ID: <abc@example.com>\r\n\
Status: RO\r\n\
\r\n\
Hello there.\r\n";

    fn find<'a>(msg: &'a Message, name: &str) -> Option<&'a PropertyValue> {
        msg.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    #[test]
    fn test_simple_message_properties() {
        let msg = parse_message(SIMPLE, None, "test").unwrap();
        assert_eq!(msg.text_property("#Subject"), Some("Here is a sample message"));
        assert_eq!(
            find(&msg, "#From"),
            Some(&PropertyValue::TextList(vec![
                "John Doe <john@example.com>".to_string()
            ]))
        );
        match find(&msg, "#To") {
            Some(PropertyValue::TextList(to)) => assert_eq!(to.len(), 2),
            other => panic!("unexpected #To: {other:?}"),
        }
        assert_eq!(find(&msg, "#HasAttachments"), Some(&PropertyValue::Boolean(false)));
        assert_eq!(find(&msg, "#AttachmentCount"), Some(&PropertyValue::Integer(0)));
        assert_eq!(find(&msg, "#ReadFlag"), Some(&PropertyValue::Boolean(true)));
        assert_eq!(msg.text_property("#MessageID"), Some("<abc@example.com>"));
        match find(&msg, "#DateSent") {
            Some(PropertyValue::DateTime(dt)) => {
                assert_eq!(dt.to_rfc3339(), "2010-06-24T19:16:17+00:00")
            }
            other => panic!("unexpected #DateSent: {other:?}"),
        }
        assert!(msg.text_property("#Header").unwrap().starts_with("From: John Doe"));
        assert!(msg.children.is_empty());
    }

    #[test]
    fn test_property_order_is_stable() {
        let msg = parse_message(SIMPLE, None, "test").unwrap();
        let names: Vec<&str> = msg.properties.iter().map(|p| p.name.as_str()).collect();
        let from = names.iter().position(|n| *n == "#From").unwrap();
        let subject = names.iter().position(|n| *n == "#Subject").unwrap();
        let count = names.iter().position(|n| *n == "#AttachmentCount").unwrap();
        assert!(from < subject && subject < count);
    }

    #[test]
    fn test_attachment_is_extracted() {
        let raw = b"From: a@example.com\r\n\
Subject: With file\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
See attached.\r\n\
--XX\r\n\
Content-Type: application/octet-stream; name=\"data.BIN\"\r\n\
Content-Disposition: attachment; filename=\"data.BIN\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAECAw==\r\n\
--XX--\r\n";
        let msg = parse_message(raw, None, "test").unwrap();
        assert_eq!(msg.children.len(), 1);
        match &msg.children[0] {
            Ok(MailItem::Attachment(att)) => {
                assert_eq!(att.filename, "data.BIN");
                assert_eq!(att.content_type.as_deref(), Some("application/octet-stream"));
                match &att.data {
                    AttachmentData::Bytes(b) => assert_eq!(b, &[0u8, 1, 2, 3]),
                    other => panic!("unexpected data: {other:?}"),
                }
                assert_eq!(
                    att.properties[1],
                    Property::text("#FileExtension", "BIN")
                );
            }
            other => panic!("unexpected child: {other:?}"),
        }
    }

    #[test]
    fn test_embedded_message_becomes_child() {
        let raw = b"From: a@example.com\r\n\
Subject: Outer\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
Forwarded.\r\n\
--XX\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
From: b@example.com\r\n\
Subject: Inner\r\n\
\r\n\
Inner body.\r\n\
--XX--\r\n";
        let msg = parse_message(raw, None, "test").unwrap();
        assert_eq!(msg.children.len(), 1);
        match &msg.children[0] {
            Ok(MailItem::Message(inner)) => {
                assert_eq!(inner.text_property("#Subject"), Some("Inner"));
            }
            other => panic!("unexpected child: {other:?}"),
        }
        assert_eq!(
            find(&msg, "#AttachmentNames"),
            Some(&PropertyValue::TextList(vec!["Inner".to_string()]))
        );
    }

    const DAMAGED_PARTS: &[u8] = b"From: a@example.com\r\n\
Subject: Damaged parts\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
Some parts are damaged.\r\n\
--XX\r\n\
Content-Type: application/pdf; name=\"broken.pdf\"\r\n\
Content-Disposition: attachment; filename=\"broken.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
!!!not*base64###\r\n\
--XX\r\n\
Content-Type: message/rfc822\r\n\
Content-Disposition: attachment\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain; name=\"ok.txt\"\r\n\
Content-Disposition: attachment; filename=\"ok.txt\"\r\n\
\r\n\
fine\r\n\
--XX--\r\n";

    #[test]
    fn test_undecodable_attachment_is_unavailable() {
        let msg = parse_message(DAMAGED_PARTS, None, "test").unwrap();
        assert_eq!(msg.children.len(), 3);
        match &msg.children[0] {
            Ok(MailItem::Attachment(att)) => {
                assert_eq!(att.filename, "broken.pdf");
                assert_eq!(att.content_type.as_deref(), Some("application/pdf"));
                assert!(matches!(att.data, AttachmentData::Unavailable(_)));
                assert!(att.properties.iter().all(|p| p.name != "#FileSize"));
            }
            other => panic!("unexpected child: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_embedded_message_is_item_error() {
        let msg = parse_message(DAMAGED_PARTS, None, "test").unwrap();
        match &msg.children[1] {
            Err(e) => {
                assert_eq!(e.location, "part 2");
                assert!(e.reason.contains("embedded message"));
            }
            other => panic!("unexpected child: {other:?}"),
        }
        match &msg.children[2] {
            Ok(MailItem::Attachment(att)) => {
                assert_eq!(att.filename, "ok.txt");
                match &att.data {
                    AttachmentData::Bytes(b) => {
                        assert_eq!(String::from_utf8_lossy(b).trim_end(), "fine")
                    }
                    other => panic!("unexpected data: {other:?}"),
                }
            }
            other => panic!("unexpected child: {other:?}"),
        }
        assert_eq!(find(&msg, "#AttachmentCount"), Some(&PropertyValue::Integer(3)));
    }

    #[test]
    fn test_received_date_is_recorded() {
        let received = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let msg = parse_message(SIMPLE, Some(received), "test").unwrap();
        assert_eq!(
            find(&msg, "#DateReceived"),
            Some(&PropertyValue::DateTime(received))
        );
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("leah_thumper.jpg"), Some("jpg"));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("trailing."), None);
    }
}
