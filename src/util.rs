use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Raw file name; not required to be UTF-8.
    pub name: OsString,
    pub full_path: PathBuf,
}

/// List the files directly inside `dir`, sorted by name.
/// Subdirectories are skipped and never descended into.
pub fn list_flat_files(dir: &Path) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to read directory entry in {}", dir.display()))?;

        if entry.file_type().is_dir() {
            continue;
        }

        entries.push(FileEntry {
            name: entry.file_name().to_os_string(),
            full_path: entry.path().to_path_buf(),
        });
    }

    Ok(entries)
}

/// Stream-hash a file using BLAKE3.
/// Uses a 256 KB BufReader to reduce syscall overhead vs the default 8 KB.
pub fn hash_file_streaming(path: &Path) -> Result<[u8; 32]> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = std::io::BufReader::with_capacity(256 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to hash file: {}", path.display()))?;
    Ok(*hasher.finalize().as_bytes())
}
