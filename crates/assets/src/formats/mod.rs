//! Format translators: each maps between on-disk bytes and node trees
//! through a uniform load/store surface used by the asset manager.

pub mod compressed;
pub mod csv;
pub mod json;
pub mod yaml;
