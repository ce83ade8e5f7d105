use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::paths::InstallLayout;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Matching,
    Missing,
    Differs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub install_dir: PathBuf,
    /// `_app.asar` is present in the new install.
    pub claimed: bool,
    pub files: BTreeMap<OsString, FileStatus>,
}

impl VerifyReport {
    pub fn is_persisted(&self) -> bool {
        self.claimed && self.files.values().all(|s| *s == FileStatus::Matching)
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.values().filter(|s| **s == status).count()
    }
}

/// BLAKE3 of every file directly inside `dir`. A missing directory hashes to nothing.
fn hash_flat_dir(dir: &Path) -> Result<BTreeMap<OsString, [u8; 32]>> {
    if !dir.exists() {
        return Ok(BTreeMap::new());
    }
    util::list_flat_files(dir)?
        .par_iter()
        .map(|entry| -> Result<(OsString, [u8; 32])> {
            Ok((entry.name.clone(), util::hash_file_streaming(&entry.full_path)?))
        })
        .collect()
}

/// Check that a new install has been claimed and carries byte-identical copies
/// of every injected file. Both directories are hashed concurrently.
pub async fn verify_install(current_app_dir: &Path, install: &InstallLayout) -> Result<VerifyReport> {
    let source_dir = current_app_dir.to_path_buf();
    let dest_dir = install.app_dir();

    let (source, dest) = tokio::try_join!(
        tokio::task::spawn_blocking(move || {
            if source_dir.exists() {
                hash_flat_dir(&source_dir)
            } else {
                Err(anyhow::anyhow!(
                    "Injected app directory not found: {}",
                    source_dir.display()
                ))
            }
        }),
        tokio::task::spawn_blocking(move || hash_flat_dir(&dest_dir)),
    )?;
    let source = source?;
    let dest = dest?;

    let files = source
        .into_iter()
        .map(|(name, hash)| {
            let status = match dest.get(&name) {
                None => FileStatus::Missing,
                Some(d) if *d == hash => FileStatus::Matching,
                Some(_) => FileStatus::Differs,
            };
            (name, status)
        })
        .collect();

    Ok(VerifyReport {
        install_dir: install.root().to_path_buf(),
        claimed: install.backup_archive().exists(),
        files,
    })
}
