//! Asset loading and entity persistence.
//!
//! Materializes trees and entities from disk in any supported format,
//! keeps the registry of persistent entities, and mirrors every mutation
//! of a persistent entity back to its files.

pub mod escape;
pub mod formats;
pub mod manager;

pub use escape::{escape_filename, unescape_filename};
pub use manager::{AssetManager, EXT_COMPRESSED, EXT_METADATA, EXT_SOURCE};
