//! Extract attachments to disk as native files.
//!
//! The stream is read exactly once; every chunk is written and hashed in the
//! same pass, so size and digest describe precisely the bytes on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::export::hash::{ContentHasher, HashAlgorithm};
use crate::model::document::{DocId, ExternalFile, FileType};
use crate::model::item::Attachment;
use crate::parser::mime::file_extension;

/// Chunk size for copying attachment streams.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Longest extension carried over from the suggested filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Writes natives into one directory.
#[derive(Debug, Clone)]
pub struct NativeExporter {
    dir: PathBuf,
    /// `dir` relative to the output directory, as recorded in `FilePath`.
    relative_dir: String,
    algorithm: HashAlgorithm,
}

impl NativeExporter {
    /// `dir` must already exist. `relative_dir` is its path inside the
    /// output directory (empty for the output directory itself).
    pub fn new(dir: impl Into<PathBuf>, relative_dir: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        Self {
            dir: dir.into(),
            relative_dir: relative_dir.into(),
            algorithm,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `attachment` as `<doc_id>[.<ext>]` and describe the result.
    ///
    /// Problems with the attachment's own content are
    /// [`ConvertError::Extraction`]; problems writing the target (it already
    /// exists, the disk is full) are [`ConvertError::Io`]. Never overwrites.
    /// On failure the partial file is removed.
    pub fn export(&self, attachment: &Attachment, doc_id: DocId) -> Result<ExternalFile> {
        let source = attachment.open().map_err(|e| source_error(attachment, e))?;

        let file_name = native_file_name(doc_id, &attachment.filename);
        let path = self.dir.join(&file_name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| ConvertError::io(&path, e))?;

        match self.copy_and_hash(attachment, source, file, &path) {
            Ok((file_size, hash)) => {
                debug!(
                    doc_id = %doc_id,
                    file = %path.display(),
                    size = file_size,
                    "Wrote native file"
                );
                Ok(ExternalFile {
                    file_name,
                    file_path: self.relative_dir.clone(),
                    file_size,
                    hash,
                    file_type: FileType::Native,
                })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!(
                        file = %path.display(),
                        error = %cleanup,
                        "Could not remove partial native file"
                    );
                }
                Err(e)
            }
        }
    }

    fn copy_and_hash(
        &self,
        attachment: &Attachment,
        mut source: Box<dyn Read + '_>,
        file: File,
        path: &Path,
    ) -> Result<(u64, String)> {
        let mut writer = BufWriter::new(file);
        let mut hasher = ContentHasher::new(self.algorithm);
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(source_error(attachment, e)),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|e| ConvertError::io(path, e))?;
            hasher.update(&buf[..n]);
            written += n as u64;
        }

        writer.flush().map_err(|e| ConvertError::io(path, e))?;
        Ok((written, hasher.finish()))
    }
}

fn source_error(attachment: &Attachment, e: std::io::Error) -> ConvertError {
    ConvertError::Extraction {
        location: format!("attachment '{}'", attachment.filename),
        reason: e.to_string(),
    }
}

/// `<doc_id>.<ext>`, where `ext` is the lowercased extension of the
/// suggested name when it is short and alphanumeric; otherwise just `<doc_id>`.
pub fn native_file_name(doc_id: DocId, suggested_name: &str) -> String {
    match file_extension(suggested_name) {
        Some(ext)
            if ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{doc_id}.{}", ext.to_ascii_lowercase())
        }
        _ => doc_id.to_string(),
    }
}
