//! Foundation utilities shared by every Sylva crate.
//!
//! Keeps the deterministic building blocks in one place: stable hashing,
//! seedable random streams, the process-wide string intern pool, and the
//! semver gate used when loading stored code.

pub mod intern;
pub mod rng;
pub mod stable_hash;
pub mod version;

pub use intern::{StringId, StringPool, NOT_A_STRING_ID};
pub use rng::RandomStream;
pub use version::{RuntimeVersion, VersionError};
