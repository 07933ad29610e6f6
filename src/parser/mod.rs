//! Email parsing: streaming mbox framing, header helpers, and MIME-to-item mapping.

pub mod header;
pub mod mbox;
pub mod mime;
