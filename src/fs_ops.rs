//! Filesystem primitives used while staging a new installation.

use anyhow::Result;
use std::io;
use std::path::Path;

use crate::util::{self, FileEntry};

/// The blocking filesystem calls the stager issues, in the order it issues them.
pub trait StagingFs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>>;
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// Direct `std::fs` implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl StagingFs for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>> {
        util::list_flat_files(dir)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }
}
