//! Conversion orchestration: archive in, output directory with an EDRM
//! loadfile and native files out.
//!
//! Preconditions (output directory absent, archive readable) are checked
//! before anything is written. Once the output directory has been created,
//! any fatal error removes it again, so a failed conversion leaves nothing
//! behind.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ConvertError, Result};
use crate::export::builder::DocumentBuilder;
use crate::export::hash::HashAlgorithm;
use crate::export::loadfile::write_loadfile;
use crate::export::native::NativeExporter;
use crate::export::traverse::{traverse, Progress};
use crate::model::document::{DocType, ExtractionFailure};
use crate::store::mbox::ReadOptions;
use crate::store::{MailStore, MboxArchive};

/// Name of the loadfile inside the output directory.
pub const LOADFILE_NAME: &str = "edrm-loadfile.xml";

/// What to do when parts of the archive could not be extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Succeed with whatever could be extracted; failures are reported.
    #[default]
    BestEffort,
    /// Any extraction failure fails the conversion.
    Strict,
}

/// Knobs for one conversion.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub failure_policy: FailurePolicy,
    pub hash_algorithm: HashAlgorithm,
    /// Subdirectory for natives; `None` puts them next to the loadfile.
    pub natives_dir: Option<String>,
    pub read: ReadOptions,
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            failure_policy: config.export.failure_policy,
            hash_algorithm: config.export.hash_algorithm,
            natives_dir: config.export.natives_dir.clone(),
            read: ReadOptions {
                read_buffer_size: config.performance.read_buffer_size,
                max_message_size: config.performance.max_message_size,
            },
        }
    }
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub output_dir: PathBuf,
    pub loadfile: PathBuf,
    pub documents: usize,
    pub messages: usize,
    pub files: usize,
    pub relationships: usize,
    pub natives_written: u64,
    pub bytes_written: u64,
    pub failures: Vec<ExtractionFailure>,
}

/// Convert `archive` into a new directory `output_dir` with default options.
///
/// Returns `true` when the loadfile was written. Errors are logged.
pub fn convert(archive: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> bool {
    match convert_with(archive, output_dir, &ExportOptions::default(), None) {
        Ok(_) => true,
        Err(e) => {
            error!(error = %e, "Conversion failed");
            false
        }
    }
}

/// Convert an mbox archive (file or folder tree) into `output_dir`.
pub fn convert_with(
    archive: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &ExportOptions,
    progress: Option<Progress<'_>>,
) -> Result<ConversionReport> {
    let output_dir = output_dir.as_ref();
    ensure_absent(output_dir)?;
    validate_natives_dir(options.natives_dir.as_deref())?;
    validate_read_options(&options.read)?;

    let archive = MboxArchive::open(archive, options.read)?;
    debug!(archive = %archive.path().display(), "Archive validated");
    convert_store(&archive, output_dir, options, progress)
}

/// Convert any [`MailStore`] into `output_dir`.
pub fn convert_store<S: MailStore>(
    store: &S,
    output_dir: impl AsRef<Path>,
    options: &ExportOptions,
    progress: Option<Progress<'_>>,
) -> Result<ConversionReport> {
    let output_dir = output_dir.as_ref();
    ensure_absent(output_dir)?;
    validate_natives_dir(options.natives_dir.as_deref())?;
    let root = store.root_folder()?;

    fs::create_dir(output_dir).map_err(|e| ConvertError::io(output_dir, e))?;
    info!(
        root = %store.folder_name(&root),
        output = %output_dir.display(),
        "Starting conversion"
    );

    match run(store, root, output_dir, options, progress) {
        Ok(report) => {
            info!(
                documents = report.documents,
                natives = report.natives_written,
                failures = report.failures.len(),
                "Conversion complete"
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(output_dir) {
                warn!(
                    output = %output_dir.display(),
                    error = %cleanup,
                    "Could not remove output directory after failure"
                );
            }
            Err(e)
        }
    }
}

fn run<S: MailStore>(
    store: &S,
    root: S::Folder,
    output_dir: &Path,
    options: &ExportOptions,
    progress: Option<Progress<'_>>,
) -> Result<ConversionReport> {
    let (natives_path, natives_rel) = match &options.natives_dir {
        Some(dir) => {
            let path = output_dir.join(dir);
            fs::create_dir(&path).map_err(|e| ConvertError::io(&path, e))?;
            (path, dir.clone())
        }
        None => (output_dir.to_path_buf(), String::new()),
    };

    let exporter = NativeExporter::new(natives_path, natives_rel, options.hash_algorithm);
    debug!(natives = %exporter.dir().display(), "Writing native files");
    let mut builder = DocumentBuilder::new(exporter);
    let loadfile = traverse(store, root, &mut builder, progress)?;

    if options.failure_policy == FailurePolicy::Strict && !loadfile.failures.is_empty() {
        return Err(ConvertError::StrictFailure {
            count: loadfile.failures.len(),
        });
    }

    let loadfile_path = output_dir.join(LOADFILE_NAME);
    let file = File::create(&loadfile_path).map_err(|e| ConvertError::io(&loadfile_path, e))?;
    write_loadfile(&loadfile, BufWriter::new(file))?;

    Ok(ConversionReport {
        output_dir: output_dir.to_path_buf(),
        loadfile: loadfile_path,
        documents: loadfile.documents.len(),
        messages: loadfile.count_of(DocType::Message),
        files: loadfile.count_of(DocType::File),
        relationships: loadfile.relationships.len(),
        natives_written: builder.natives_written(),
        bytes_written: builder.bytes_written(),
        failures: loadfile.failures,
    })
}

/// Fail unless nothing exists at `path`. Symlinks count as existing.
fn ensure_absent(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(ConvertError::OutputExists(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConvertError::io(path, e)),
    }
}

/// The natives directory must be one plain path component.
fn validate_natives_dir(dir: Option<&str>) -> Result<()> {
    let Some(dir) = dir else {
        return Ok(());
    };
    let mut components = Path::new(dir).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name != LOADFILE_NAME => Ok(()),
        _ => Err(ConvertError::Config(format!(
            "natives_dir must be a single directory name inside the output directory, got '{dir}'"
        ))),
    }
}

/// A zero buffer reads every mbox as empty and a zero size limit drops
/// every message, so both are configuration errors.
fn validate_read_options(read: &ReadOptions) -> Result<()> {
    if read.read_buffer_size == 0 {
        return Err(ConvertError::Config(
            "read_buffer_size must be greater than zero".to_string(),
        ));
    }
    if read.max_message_size == 0 {
        return Err(ConvertError::Config(
            "max_message_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::item::{Attachment, AttachmentData, Message, Property};
    use crate::store::{MemoryFolder, MemoryStore};

    fn store_with_attachment(data: AttachmentData) -> MemoryStore {
        MemoryStore::new(
            MemoryFolder::new("Top").with_message(
                Message::new(vec![Property::text("#Subject", "Here is a sample message")])
                    .with_attachment(Attachment::new(
                        "leah_thumper.jpg",
                        vec![Property::text("#FileName", "leah_thumper.jpg")],
                        data,
                    )),
            ),
        )
    }

    #[test]
    fn test_validate_natives_dir() {
        assert!(validate_natives_dir(None).is_ok());
        assert!(validate_natives_dir(Some("natives")).is_ok());
        assert!(validate_natives_dir(Some("")).is_err());
        assert!(validate_natives_dir(Some("..")).is_err());
        assert!(validate_natives_dir(Some("a/b")).is_err());
        assert!(validate_natives_dir(Some("/abs")).is_err());
        assert!(validate_natives_dir(Some(LOADFILE_NAME)).is_err());
    }

    #[test]
    fn test_validate_read_options() {
        assert!(validate_read_options(&ReadOptions::default()).is_ok());
        let no_buffer = ReadOptions {
            read_buffer_size: 0,
            ..ReadOptions::default()
        };
        assert!(matches!(
            validate_read_options(&no_buffer),
            Err(ConvertError::Config(_))
        ));
        let no_messages = ReadOptions {
            max_message_size: 0,
            ..ReadOptions::default()
        };
        assert!(matches!(
            validate_read_options(&no_messages),
            Err(ConvertError::Config(_))
        ));
    }

    #[test]
    fn test_zero_read_buffer_is_rejected_before_output() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("one.mbox");
        fs::write(
            &archive,
            "From a@example.com Thu Jan  4 10:00:00 2024\nSubject: one\n\nbody\n",
        )
        .unwrap();
        let out = tmp.path().join("out");
        let options = ExportOptions {
            read: ReadOptions {
                read_buffer_size: 0,
                ..ReadOptions::default()
            },
            ..ExportOptions::default()
        };

        let err = convert_with(&archive, &out, &options, None).unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_convert_store_writes_loadfile_and_native() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let store = store_with_attachment(AttachmentData::Bytes(vec![0xff, 0xd8, 0xff]));

        let report = convert_store(&store, &out, &ExportOptions::default(), None).unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.messages, 1);
        assert_eq!(report.files, 1);
        assert_eq!(report.natives_written, 1);
        assert_eq!(report.bytes_written, 3);
        assert!(out.join(LOADFILE_NAME).is_file());
        assert!(out.join("d0000002.jpg").is_file());
    }

    #[test]
    fn test_natives_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let store = store_with_attachment(AttachmentData::Bytes(b"jpeg".to_vec()));
        let options = ExportOptions {
            natives_dir: Some("natives".to_string()),
            ..ExportOptions::default()
        };

        convert_store(&store, &out, &options, None).unwrap();
        assert!(out.join("natives").join("d0000002.jpg").is_file());
        let xml = fs::read_to_string(out.join(LOADFILE_NAME)).unwrap();
        assert!(xml.contains("FilePath=\"natives\""));
    }

    #[test]
    fn test_existing_output_is_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("keep.txt"), "x").unwrap();
        let store = store_with_attachment(AttachmentData::Bytes(b"x".to_vec()));

        let err = convert_store(&store, &out, &ExportOptions::default(), None).unwrap_err();
        assert!(matches!(err, ConvertError::OutputExists(_)));
        assert!(out.join("keep.txt").is_file());
        assert!(!out.join(LOADFILE_NAME).exists());
    }

    #[test]
    fn test_best_effort_keeps_partial_output() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let store = store_with_attachment(AttachmentData::Unavailable("bad base64".into()));

        let report = convert_store(&store, &out, &ExportOptions::default(), None).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.natives_written, 0);
        assert!(out.join(LOADFILE_NAME).is_file());
    }

    #[test]
    fn test_strict_failure_removes_output() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let store = store_with_attachment(AttachmentData::Unavailable("bad base64".into()));
        let options = ExportOptions {
            failure_policy: FailurePolicy::Strict,
            ..ExportOptions::default()
        };

        let err = convert_store(&store, &out, &options, None).unwrap_err();
        assert!(matches!(err, ConvertError::StrictFailure { count: 1 }));
        assert!(!out.exists());
    }

    #[test]
    fn test_convert_missing_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        assert!(!convert(tmp.path().join("missing.mbox"), &out));
        assert!(!out.exists());
    }

    #[test]
    fn test_failure_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FailurePolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"best-effort\"").unwrap();
        assert_eq!(w.policy, FailurePolicy::BestEffort);
        let w: Wrapper = toml::from_str("policy = \"strict\"").unwrap();
        assert_eq!(w.policy, FailurePolicy::Strict);
    }
}
