use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every versioned installation directory under the install root.
pub const INSTALL_DIR_PREFIX: &str = "app-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent { input: String, component: String },
}

/// Ordered version components, e.g. `[1, 2, 3]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTuple(pub Vec<u64>);

impl VersionTuple {
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for VersionTuple {
    fn from(components: Vec<u64>) -> Self {
        Self(components)
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for VersionTuple {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| VersionError::InvalidComponent {
                        input: trimmed.to_string(),
                        component: part.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(VersionTuple)
    }
}

/// Version record reported by the host updater's synchronous query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVersions {
    pub current_host: VersionTuple,
}

impl HostVersions {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Directory name of the installation for `version`, e.g. `app-1.2.3`.
pub fn install_dir_name(version: &VersionTuple) -> String {
    format!("{INSTALL_DIR_PREFIX}{version}")
}

/// Root of the freshly staged installation. Pure path computation, no I/O.
pub fn resolve_install_dir(install_root: &Path, version: &VersionTuple) -> PathBuf {
    install_root.join(install_dir_name(version))
}
