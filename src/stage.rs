use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::fs_ops::StagingFs;
use crate::paths::InstallLayout;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub archive_renamed: bool,
    pub app_dir_created: bool,
    pub files_copied: usize,
    pub bytes_copied: u64,
}

/// Claim a freshly staged installation and copy the injected files into it.
///
/// Steps run strictly in order, each finishing before the next starts:
/// 1. `resources/app.asar` is renamed to `resources/_app.asar` unless the backup already exists.
/// 2. `resources/app` is created unless it already exists.
/// 3. Every file directly inside `current_app_dir` is copied into it, overwriting.
///
/// Filesystem errors are returned as-is with path context; nothing already done is undone.
pub fn stage_install(
    fs: &dyn StagingFs,
    current_app_dir: &Path,
    install: &InstallLayout,
) -> Result<StageSummary> {
    let mut summary = StageSummary::default();

    // 1. app.asar -> _app.asar
    let backup = install.backup_archive();
    if !fs.exists(&backup) {
        let original = install.original_archive();
        fs.rename(&original, &backup).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                original.display(),
                backup.display()
            )
        })?;
        summary.archive_renamed = true;
        debug!(archive = %backup.display(), "claimed installation");
    } else {
        debug!(archive = %backup.display(), "installation already claimed");
    }

    // 2. resources/app
    let app_dir = install.app_dir();
    if !fs.exists(&app_dir) {
        fs.create_dir(&app_dir)
            .with_context(|| format!("Failed to create directory: {}", app_dir.display()))?;
        summary.app_dir_created = true;
    }

    // 3. Flat copy, no existence guard.
    let files = fs.list_files(current_app_dir).with_context(|| {
        format!(
            "Failed to list injected files in {}",
            current_app_dir.display()
        )
    })?;
    for file in &files {
        let dest = app_dir.join(&file.name);
        let bytes = fs.copy_file(&file.full_path, &dest).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                file.full_path.display(),
                dest.display()
            )
        })?;
        summary.files_copied += 1;
        summary.bytes_copied += bytes;
    }

    info!(
        install = %install.root().display(),
        files = summary.files_copied,
        "staged injected files"
    );

    Ok(summary)
}
