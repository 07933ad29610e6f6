//! Core data model: mail-store items on the input side, loadfile documents on the output side.

pub mod address;
pub mod document;
pub mod item;
