//! In-memory mail store, for tests and for callers that build item trees themselves.

use crate::error::{ConvertError, Result};
use crate::model::item::{ItemError, Message};

use super::{MailStore, MessageIter};

/// A folder with its messages and subfolders.
#[derive(Debug, Clone, Default)]
pub struct MemoryFolder {
    pub name: String,
    /// `Err` entries stand for messages the source could not produce.
    pub messages: Vec<std::result::Result<Message, ItemError>>,
    pub subfolders: Vec<MemoryFolder>,
}

impl MemoryFolder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(Ok(message));
        self
    }

    pub fn with_broken_message(mut self, error: ItemError) -> Self {
        self.messages.push(Err(error));
        self
    }

    pub fn with_subfolder(mut self, folder: MemoryFolder) -> Self {
        self.subfolders.push(folder);
        self
    }
}

/// Store over a [`MemoryFolder`] tree. Folder handles are index paths from the root.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: MemoryFolder,
}

impl MemoryStore {
    pub fn new(root: MemoryFolder) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &[usize]) -> Result<&MemoryFolder> {
        let mut folder = &self.root;
        for &i in path {
            folder = folder.subfolders.get(i).ok_or_else(|| ConvertError::Extraction {
                location: format!("folder {path:?}"),
                reason: "no such folder".to_string(),
            })?;
        }
        Ok(folder)
    }
}

impl MailStore for MemoryStore {
    type Folder = Vec<usize>;

    fn root_folder(&self) -> Result<Vec<usize>> {
        Ok(Vec::new())
    }

    fn folder_name(&self, folder: &Vec<usize>) -> String {
        let mut names = vec![self.root.name.clone()];
        let mut current = &self.root;
        for &i in folder {
            match current.subfolders.get(i) {
                Some(f) => {
                    names.push(f.name.clone());
                    current = f;
                }
                None => break,
            }
        }
        names.join("/")
    }

    fn subfolders(&self, folder: &Vec<usize>) -> Result<Vec<Vec<usize>>> {
        let resolved = self.resolve(folder)?;
        Ok((0..resolved.subfolders.len())
            .map(|i| {
                let mut path = folder.clone();
                path.push(i);
                path
            })
            .collect())
    }

    fn messages<'a>(&'a self, folder: &Vec<usize>) -> Result<MessageIter<'a>> {
        let resolved = self.resolve(folder)?;
        Ok(Box::new(resolved.messages.iter().map(|m| {
            m.clone().map_err(|e| ConvertError::Extraction {
                location: e.location,
                reason: e.reason,
            })
        })))
    }
}
