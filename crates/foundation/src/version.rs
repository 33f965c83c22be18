//! Semver gate for stored code.
//!
//! Stored entities may declare the runtime version that wrote them. Loads
//! refuse files written by a newer runtime, or by an older *major* version.
//! Development builds (non-empty prerelease suffix, or an all-zero runtime
//! version) skip the check entirely.

use thiserror::Error;

/// Version parsing / compatibility errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version number: {0}")]
    Invalid(String),

    #[error("stored code is more recent than runtime version {runtime}: {stored}")]
    StoredTooNew { stored: String, runtime: String },

    #[error("stored code major version is older than runtime version {runtime}: {stored}")]
    StoredTooOld { stored: String, runtime: String },
}

/// The runtime's own semver, parsed once from the crate version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub prerelease: String,
}

impl RuntimeVersion {
    /// Parse a `major.minor.patch[-prerelease]` string.
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        let (core, prerelease) = match version.split_once('-') {
            Some((core, pre)) => (core, pre.to_string()),
            None => (version, String::new()),
        };
        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Invalid(version.to_string()));
        }
        let parse_part = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| VersionError::Invalid(version.to_string()))
        };
        Ok(Self {
            major: parse_part(parts[0])?,
            minor: parse_part(parts[1])?,
            patch: parse_part(parts[2])?,
            prerelease,
        })
    }

    /// The version this runtime was built as.
    pub fn current() -> Self {
        Self::parse(env!("CARGO_PKG_VERSION")).expect("crate version is valid semver")
    }

    /// Whether this is a development build, which skips load-time checks.
    pub fn is_dev_build(&self) -> bool {
        !self.prerelease.is_empty() || (self.major == 0 && self.minor == 0 && self.patch == 0)
    }

    fn render(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Validate a stored file's declared version against this runtime.
    pub fn validate_stored(&self, stored: &str) -> Result<(), VersionError> {
        let parsed = RuntimeVersion::parse(stored)?;
        if self.is_dev_build() {
            return Ok(());
        }
        let newer = (parsed.major, parsed.minor, parsed.patch)
            > (self.major, self.minor, self.patch);
        if newer {
            return Err(VersionError::StoredTooNew {
                stored: stored.to_string(),
                runtime: self.render(),
            });
        }
        if parsed.major < self.major {
            return Err(VersionError::StoredTooOld {
                stored: stored.to_string(),
                runtime: self.render(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(v: &str) -> RuntimeVersion {
        RuntimeVersion::parse(v).unwrap()
    }

    #[test]
    fn test_parse() {
        let v = runtime("1.2.3-beta");
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert_eq!(v.prerelease, "beta");
        assert!(RuntimeVersion::parse("1.2").is_err());
        assert!(RuntimeVersion::parse("a.b.c").is_err());
    }

    #[test]
    fn test_rejects_newer() {
        let rt = runtime("1.4.2");
        assert!(rt.validate_stored("99.0.0").is_err());
        assert!(rt.validate_stored("1.5.0").is_err());
        assert!(rt.validate_stored("1.4.3").is_err());
        assert!(rt.validate_stored("1.4.2").is_ok());
        assert!(rt.validate_stored("1.3.9").is_ok());
    }

    #[test]
    fn test_rejects_older_major() {
        let rt = runtime("2.0.0");
        assert!(matches!(
            rt.validate_stored("1.9.9"),
            Err(VersionError::StoredTooOld { .. })
        ));
    }

    #[test]
    fn test_dev_build_skips_checks() {
        assert!(runtime("1.0.0-dev").validate_stored("99.0.0").is_ok());
        assert!(runtime("0.0.0").validate_stored("99.0.0").is_ok());
    }
}
