//! mbox folder-tree archive.
//!
//! An archive is either a single mbox file (one folder) or a directory whose
//! mbox files and subdirectories become subfolders. Thunderbird's layout is
//! understood: the subfolders of mailbox `Inbox` live in `Inbox.sbd/`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::parser::header;
use crate::parser::mbox::{self, MboxReader, Sniff};
use crate::parser::mime;

use super::{MailStore, MessageIter};

/// Suffix of Thunderbird subfolder directories.
const SBD_SUFFIX: &str = ".sbd";

/// Tuning for reading mbox files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub read_buffer_size: usize,
    pub max_message_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: mbox::DEFAULT_READ_BUFFER_SIZE,
            max_message_size: mbox::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// A folder of an mbox archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxFolder {
    /// Slash-separated path from the archive root, e.g. `Mail/Inbox/Work`.
    pub display: String,
    /// mbox file holding this folder's messages.
    pub mbox: Option<PathBuf>,
    /// Directory holding this folder's subfolders.
    pub dir: Option<PathBuf>,
}

/// An opened mbox archive.
#[derive(Debug)]
pub struct MboxArchive {
    path: PathBuf,
    options: ReadOptions,
}

impl MboxArchive {
    /// Open and validate an archive.
    ///
    /// A file must sniff as mbox (or be empty); a directory must hold at
    /// least one such file somewhere below it.
    pub fn open(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvertError::ArchiveNotFound(path.clone())
            } else {
                ConvertError::io(&path, e)
            }
        })?;

        if metadata.is_file() {
            if mbox::sniff_file(&path)? == Sniff::NotMbox {
                return Err(ConvertError::InvalidArchive {
                    path,
                    reason: "file does not start with a 'From ' separator".to_string(),
                });
            }
        } else if metadata.is_dir() {
            if !contains_mailbox(&path)? {
                return Err(ConvertError::InvalidArchive {
                    path,
                    reason: "directory contains no mbox files".to_string(),
                });
            }
        } else {
            return Err(ConvertError::InvalidArchive {
                path,
                reason: "neither a regular file nor a directory".to_string(),
            });
        }

        info!(path = %path.display(), "Opened mbox archive");
        Ok(Self { path, options })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MailStore for MboxArchive {
    type Folder = MboxFolder;

    fn root_folder(&self) -> Result<MboxFolder> {
        let name = folder_name_for(&self.path);
        if self.path.is_dir() {
            Ok(MboxFolder {
                display: name,
                mbox: None,
                dir: Some(self.path.clone()),
            })
        } else {
            Ok(MboxFolder {
                display: name,
                mbox: Some(self.path.clone()),
                dir: sbd_dir_for(&self.path),
            })
        }
    }

    fn folder_name(&self, folder: &MboxFolder) -> String {
        folder.display.clone()
    }

    fn subfolders(&self, folder: &MboxFolder) -> Result<Vec<MboxFolder>> {
        let Some(dir) = &folder.dir else {
            return Ok(Vec::new());
        };

        let mut entries = fs::read_dir(dir)
            .map_err(|e| ConvertError::io(dir, e))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| ConvertError::io(dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        let mut folders = Vec::new();
        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().map_err(|e| ConvertError::io(&path, e))?;

            if file_type.is_dir() {
                if let Some(stem) = file_name.strip_suffix(SBD_SUFFIX) {
                    if is_mailbox_file(&dir.join(stem)) {
                        // Picked up together with its mailbox file.
                        continue;
                    }
                }
                folders.push(MboxFolder {
                    display: format!("{}/{}", folder.display, folder_name_for(&path)),
                    mbox: None,
                    dir: Some(path),
                });
            } else if file_type.is_file() {
                if !is_mailbox_file(&path) {
                    debug!(path = %path.display(), "Skipping non-mbox file");
                    continue;
                }
                folders.push(MboxFolder {
                    display: format!("{}/{}", folder.display, folder_name_for(&path)),
                    dir: sbd_dir_for(&path),
                    mbox: Some(path),
                });
            } else {
                debug!(path = %path.display(), "Skipping symlink or special file");
            }
        }

        Ok(folders)
    }

    fn messages<'a>(&'a self, folder: &MboxFolder) -> Result<MessageIter<'a>> {
        let Some(path) = folder.mbox.clone() else {
            return Ok(Box::new(std::iter::empty()));
        };

        let reader = MboxReader::open(
            &path,
            self.options.read_buffer_size,
            self.options.max_message_size,
        )?;
        let display = folder.display.clone();
        let max_message_size = self.options.max_message_size;

        let iter = reader.enumerate().map(move |(n, raw)| {
            let raw = raw.map_err(|e| ConvertError::io(&path, e))?;
            // Never parse a cut-off message.
            if raw.truncated {
                return Err(ConvertError::Parse {
                    path: path.clone(),
                    offset: raw.offset,
                    reason: format!("message exceeds the {max_message_size} byte size limit"),
                });
            }
            let location = format!("{display} message {} (offset {})", n + 1, raw.offset);
            let received = header::separator_date(&raw.separator);
            mime::parse_message(&raw.bytes, received, &location).map_err(|e| match e {
                ConvertError::Extraction { reason, .. } => ConvertError::Parse {
                    path: path.clone(),
                    offset: raw.offset,
                    reason,
                },
                other => other,
            })
        });
        Ok(Box::new(iter))
    }
}

/// Whether `path` is a regular file that can hold messages.
///
/// Unreadable files count as mailboxes so that the failure surfaces when
/// their messages are read.
fn is_mailbox_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match mbox::sniff_file(path) {
        Ok(Sniff::NotMbox) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot inspect file, treating as mailbox");
            true
        }
    }
}

/// Whether the tree under `dir` holds a mailbox file. Hidden entries and
/// symlinks are ignored, as when listing subfolders.
fn contains_mailbox(dir: &Path) -> Result<bool> {
    let mut dirs = vec![dir.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in fs::read_dir(&dir).map_err(|e| ConvertError::io(&dir, e))? {
            let entry = entry.map_err(|e| ConvertError::io(&dir, e))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| ConvertError::io(&path, e))?;
            if file_type.is_dir() {
                dirs.push(path);
            } else if file_type.is_file() && is_mailbox_file(&path) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Thunderbird subfolder directory of a mailbox file, if present.
fn sbd_dir_for(mbox_path: &Path) -> Option<PathBuf> {
    let mut name = mbox_path.file_name()?.to_os_string();
    name.push(SBD_SUFFIX);
    let sbd = mbox_path.with_file_name(name);
    sbd.is_dir().then_some(sbd)
}

/// Folder name for a file or directory: the file name without a `.mbox`,
/// `.mbx` or `.sbd` suffix.
fn folder_name_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    for suffix in [".mbox", ".mbx", SBD_SUFFIX] {
        if let Some(stem) = name.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    name
}
