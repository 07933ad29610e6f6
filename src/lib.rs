//! `mailedrm` converts mail-store archives into EDRM XML loadfiles.
//!
//! An archive is walked depth first. Every message and attachment becomes a
//! document with a sequential identifier and metadata tags; attachments are
//! extracted byte-for-byte as native files with a size and content hash.
//! Containment becomes parent/child relationships. The result is written as
//! `edrm-loadfile.xml` next to the natives.
//!
//! ```no_run
//! let ok = mailedrm::convert::convert("archive.mbox", "out");
//! assert!(ok);
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod store;

pub use convert::{convert, convert_store, convert_with, ConversionReport, ExportOptions};
pub use error::{ConvertError, Result};
