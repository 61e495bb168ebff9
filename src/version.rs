//! Version reporting

use std::fmt;

/// Name of the wire driver the facade forwards to
pub const DRIVER_NAME: &str = "mongodb-rust-driver";

/// Driver version requirement the crate is built against, as declared in
/// Cargo.toml. The resolved release may be any compatible `3.x`.
pub const DRIVER_REQUIREMENT: &str = "^3.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub package: &'static str,
    pub version: &'static str,
    pub driver: &'static str,
    pub driver_requirement: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            package: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            driver: DRIVER_NAME,
            driver_requirement: DRIVER_REQUIREMENT,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} {})",
            self.package, self.version, self.driver, self.driver_requirement
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = VersionInfo::current();
        assert_eq!(info.package, "soradb");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.driver_requirement.starts_with('^'));
        assert_eq!(
            info.to_string(),
            format!("soradb {} (mongodb-rust-driver ^3.1)", info.version)
        );
    }
}
