//! Path layout of the running installation and of a freshly staged one.

use std::path::{Component, Path, PathBuf};

pub const ARCHIVE_NAME: &str = "app.asar";
pub const BACKUP_ARCHIVE_NAME: &str = "_app.asar";
pub const APP_DIR_NAME: &str = "app";
pub const RESOURCES_DIR_NAME: &str = "resources";

/// Paths derived from the currently running archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    archive: PathBuf,
}

impl ArchiveLayout {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Directory holding the archive (`.../resources`).
    pub fn resources_dir(&self) -> PathBuf {
        self.archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// The modification's app directory, a sibling of the archive.
    pub fn current_app_dir(&self) -> PathBuf {
        self.resources_dir().join(APP_DIR_NAME)
    }

    /// Application bundle root, two levels above the archive's directory.
    pub fn bundle_path(&self) -> PathBuf {
        normalize_lexically(&self.resources_dir().join("..").join(".."))
    }

    /// Install root under which `app-<version>` directories live, assuming the
    /// archive sits at `<root>/app-<version>/resources/app.asar`.
    pub fn default_install_root(&self) -> PathBuf {
        self.bundle_path()
    }
}

/// Paths inside a newly staged `app-<version>` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join(RESOURCES_DIR_NAME)
    }

    pub fn original_archive(&self) -> PathBuf {
        self.resources_dir().join(ARCHIVE_NAME)
    }

    /// Renamed original archive; its presence marks the install as claimed.
    pub fn backup_archive(&self) -> PathBuf {
        self.resources_dir().join(BACKUP_ARCHIVE_NAME)
    }

    pub fn app_dir(&self) -> PathBuf {
        self.resources_dir().join(APP_DIR_NAME)
    }
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
