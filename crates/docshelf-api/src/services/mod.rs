//! Service layer for docshelf-api.

pub mod export;

pub use export::{write_export, DirectoryPicker};
