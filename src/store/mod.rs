//! Archive reader boundary.
//!
//! A [`MailStore`] exposes a folder tree. Folders are opaque handles owned by
//! the store; each folder yields its messages as fully built item trees.

pub mod mbox;
pub mod memory;

use crate::error::Result;
use crate::model::item::Message;

/// Messages of one folder, in source order. A failed entry does not end
/// the iteration.
pub type MessageIter<'a> = Box<dyn Iterator<Item = Result<Message>> + 'a>;

/// A readable mail-store archive.
pub trait MailStore {
    /// Store-specific folder handle.
    type Folder;

    /// The top of the folder tree.
    fn root_folder(&self) -> Result<Self::Folder>;

    /// Display name of a folder, used in logs and failure locations.
    fn folder_name(&self, folder: &Self::Folder) -> String;

    /// Direct subfolders, in source order.
    fn subfolders(&self, folder: &Self::Folder) -> Result<Vec<Self::Folder>>;

    /// Messages directly inside `folder`.
    fn messages<'a>(&'a self, folder: &Self::Folder) -> Result<MessageIter<'a>>;
}

pub use mbox::MboxArchive;
pub use memory::{MemoryFolder, MemoryStore};
