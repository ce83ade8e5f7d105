use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::fs_ops::{RealFs, StagingFs};
use crate::paths::{ArchiveLayout, InstallLayout};
use crate::signing::{self, CodeSigner, Codesign, Platform, SignOutcome, SigningConfig};
use crate::stage::{self, StageSummary};
use crate::version::{self, VersionTuple};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub install_dir: PathBuf,
    pub stage: StageSummary,
    pub signing: SignOutcome,
}

/// Resolve the new install dir, stage the injected files into it, then repair
/// the bundle signature. Each step completes before the next begins.
#[derive(Clone)]
pub struct PersistSequence {
    fs: Arc<dyn StagingFs>,
    signer: Arc<dyn CodeSigner>,
    platform: Platform,
    signing: SigningConfig,
}

impl PersistSequence {
    pub fn new(
        fs: Arc<dyn StagingFs>,
        signer: Arc<dyn CodeSigner>,
        platform: Platform,
        signing: SigningConfig,
    ) -> Self {
        Self {
            fs,
            signer,
            platform,
            signing,
        }
    }

    /// Real filesystem, the `codesign` tool, and the platform this binary was built for.
    pub fn system(signing: SigningConfig) -> Self {
        Self::new(
            Arc::new(RealFs),
            Arc::new(Codesign::default()),
            Platform::current(),
            signing,
        )
    }

    /// Staging errors are returned; signing problems only show up in the report.
    pub fn run(
        &self,
        archive: &ArchiveLayout,
        install_root: &Path,
        version: &VersionTuple,
    ) -> Result<PersistReport> {
        let install_dir = version::resolve_install_dir(install_root, version);
        info!(install = %install_dir.display(), "persisting modification into new install");

        let install = InstallLayout::new(&install_dir);
        let stage = stage::stage_install(self.fs.as_ref(), &archive.current_app_dir(), &install)?;

        let signing = signing::restore_signature(
            self.signer.as_ref(),
            self.platform,
            &archive.bundle_path(),
            &self.signing,
        );

        Ok(PersistReport {
            install_dir,
            stage,
            signing,
        })
    }
}
