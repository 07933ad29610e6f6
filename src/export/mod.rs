//! EDRM export: tag mapping, native extraction, traversal and loadfile XML.

pub mod builder;
pub mod hash;
pub mod loadfile;
pub mod native;
pub mod tags;
pub mod traverse;

pub use builder::DocumentBuilder;
pub use hash::HashAlgorithm;
pub use native::NativeExporter;
pub use traverse::traverse;
