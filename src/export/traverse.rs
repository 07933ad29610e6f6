//! Depth-first walk of a mail store into a [`Loadfile`].
//!
//! Visitation order is fixed:
//!
//! - a folder's messages, then each subfolder in source order (depth first);
//! - a message, then each embedded sub-message with its whole subtree, then
//!   its plain-file attachments, each group in source order.
//!
//! Identifiers are handed out in exactly that order. Both walks use explicit
//! stacks, so arbitrarily deep folder trees or message chains cannot exhaust
//! the call stack.
//!
//! Anything the store cannot produce (a folder listing, a message, a child
//! item, a native file's content) becomes an [`ExtractionFailure`]; its
//! siblings are still visited. Failing to write into the output directory
//! ends the walk with an error.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::export::builder::DocumentBuilder;
use crate::model::document::{
    DocId, DocIdSequence, Document, ExtractionFailure, Loadfile, Relationship,
};
use crate::model::item::{Attachment, MailItem, Message};
use crate::store::MailStore;

/// Progress callback, called with the number of documents emitted so far.
pub type Progress<'p> = &'p dyn Fn(u64);

enum Node<'a> {
    Message(&'a Message),
    Attachment(&'a Attachment),
}

struct Pending<'a> {
    node: Node<'a>,
    parent: Option<DocId>,
    location: String,
}

/// Walk `root` and everything below it, building the loadfile.
///
/// Problems with the archive's content are captured in
/// [`Loadfile::failures`]. Only write errors from the builder are returned.
pub fn traverse<S: MailStore>(
    store: &S,
    root: S::Folder,
    builder: &mut DocumentBuilder,
    progress: Option<Progress<'_>>,
) -> Result<Loadfile> {
    let mut walker = Walker {
        builder,
        ids: DocIdSequence::new(),
        loadfile: Loadfile::new(),
        progress,
    };

    let mut folders = vec![root];
    while let Some(folder) = folders.pop() {
        let name = store.folder_name(&folder);
        debug!(folder = %name, "Entering folder");

        match store.messages(&folder) {
            Ok(messages) => {
                for (n, message) in messages.enumerate() {
                    match message {
                        Ok(message) => {
                            walker.walk_message(&message, format!("{name} message {}", n + 1))?
                        }
                        Err(e) => walker.fail(format!("{name} message {}", n + 1), None, e.to_string()),
                    }
                }
            }
            Err(e) => walker.fail(name.clone(), None, format!("cannot list messages: {e}")),
        }

        match store.subfolders(&folder) {
            // Reversed so the first subfolder is popped first.
            Ok(subfolders) => folders.extend(subfolders.into_iter().rev()),
            Err(e) => walker.fail(name, None, format!("cannot list subfolders: {e}")),
        }
    }

    let loadfile = walker.loadfile;
    info!(
        documents = loadfile.documents.len(),
        relationships = loadfile.relationships.len(),
        failures = loadfile.failures.len(),
        "Traversal complete"
    );
    Ok(loadfile)
}

struct Walker<'b, 'p> {
    builder: &'b mut DocumentBuilder,
    ids: DocIdSequence,
    loadfile: Loadfile,
    progress: Option<Progress<'p>>,
}

impl Walker<'_, '_> {
    /// Emit a top-level message and its whole subtree.
    fn walk_message(&mut self, message: &Message, location: String) -> Result<()> {
        let mut stack = vec![Pending {
            node: Node::Message(message),
            parent: None,
            location,
        }];

        while let Some(Pending {
            node,
            parent,
            location,
        }) = stack.pop()
        {
            let doc_id = self.ids.next_id();
            if let Some(parent) = parent {
                self.loadfile.relationships.push(Relationship {
                    parent,
                    child: doc_id,
                });
            }

            match node {
                Node::Message(message) => {
                    let document = self.builder.build_message(message, doc_id);
                    self.emit(document);

                    let mut messages = Vec::new();
                    let mut attachments = Vec::new();
                    for (n, child) in message.children.iter().enumerate() {
                        let child_location = format!("{location} / part {}", n + 1);
                        match child {
                            Ok(MailItem::Message(m)) => messages.push(Pending {
                                node: Node::Message(m),
                                parent: Some(doc_id),
                                location: child_location,
                            }),
                            Ok(MailItem::Attachment(a)) => attachments.push(Pending {
                                node: Node::Attachment(a),
                                parent: Some(doc_id),
                                location: child_location,
                            }),
                            Err(e) => self.fail(
                                format!("{location} / {}", e.location),
                                Some(doc_id),
                                e.reason.clone(),
                            ),
                        }
                    }
                    // Popped in reverse: sub-messages first, each group in source order.
                    stack.extend(attachments.into_iter().rev());
                    stack.extend(messages.into_iter().rev());
                }
                Node::Attachment(attachment) => {
                    let document = self.builder.build_attachment(attachment, doc_id)?;
                    if let Some(reason) = &document.native_error {
                        self.fail(
                            format!("{location} '{}'", attachment.filename),
                            parent,
                            reason.clone(),
                        );
                    }
                    self.emit(document);
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, document: Document) {
        debug!(
            doc_id = %document.doc_id,
            doc_type = document.doc_type.as_str(),
            tags = document.tags.len(),
            "Emitted document"
        );
        self.loadfile.documents.push(document);
        if let Some(progress) = self.progress {
            progress(self.loadfile.documents.len() as u64);
        }
    }

    fn fail(&mut self, location: String, parent: Option<DocId>, reason: String) {
        warn!(location = %location, reason = %reason, "Skipping item that could not be extracted");
        self.loadfile.failures.push(ExtractionFailure {
            location,
            parent,
            reason,
        });
    }
}
