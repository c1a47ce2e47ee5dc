use std::fmt::{Display, Formatter};
use std::fmt;

/// Build/version metadata. Simplified from the `build.rs`-injected,
/// git-revision-aware scheme used elsewhere in this tree: this workspace
/// has no CI-populated build environment, so it reports what `cargo`
/// itself knows at compile time.
#[derive(serde::Serialize, Clone, Debug, Default)]
pub struct BuildInfo {
    pub version: String,
}

impl BuildInfo {
    pub fn new() -> Self {
        BuildInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Display for BuildInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "xfer version.BuildInfo{{Version:\"{}\"}}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_cargo_version() {
        let info = BuildInfo::new();
        assert!(!info.version.is_empty());
    }
}
