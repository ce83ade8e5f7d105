use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use persist::signing::{self, DEFAULT_SIGN_IDENTITY};
use persist::verify::{self, FileStatus};
use persist::{logging, version, ArchiveLayout, HostVersions, InstallLayout, PersistSequence, Platform, SigningConfig, VersionTuple};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "persist", about = "Keep a modification installed across host app updates")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the install directory a host version is staged into
    Resolve {
        /// Path to the currently running app.asar
        #[arg(long)]
        archive: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Copy the injected files into a newly staged host version
    Stage {
        /// Path to the currently running app.asar
        #[arg(long)]
        archive: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Identity used when the bundle has to be re-signed
        #[arg(long, env = "PERSIST_SIGN_IDENTITY", default_value = DEFAULT_SIGN_IDENTITY)]
        identity: String,
    },
    /// Verify the bundle signature and re-sign it if it is broken
    Sign {
        /// Path to the application bundle
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long, env = "PERSIST_SIGN_IDENTITY", default_value = DEFAULT_SIGN_IDENTITY)]
        identity: String,
    },
    /// Check that a staged host version carries the injected files
    Verify {
        /// Path to the currently running app.asar
        #[arg(long)]
        archive: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Newly staged host version, e.g. 1.0.9013
    #[arg(long, conflicts_with = "versions_file", required_unless_present = "versions_file")]
    version: Option<VersionTuple>,
    /// JSON version record from the host updater, e.g. {"current_host": [1, 0, 9013]}
    #[arg(long)]
    versions_file: Option<PathBuf>,
    /// Directory holding the app-* installs (defaults to two levels above the archive's directory)
    #[arg(long)]
    root: Option<PathBuf>,
}

impl TargetArgs {
    fn resolve(&self, archive: &ArchiveLayout) -> Result<(PathBuf, VersionTuple)> {
        let version = match (&self.version, &self.versions_file) {
            (Some(version), _) => version.clone(),
            (None, Some(file)) => {
                let raw = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read versions file: {}", file.display()))?;
                HostVersions::from_json(&raw)
                    .with_context(|| format!("Failed to parse versions file: {}", file.display()))?
                    .current_host
            }
            (None, None) => bail!("Either --version or --versions-file is required"),
        };
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| archive.default_install_root());
        Ok((root, version))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Resolve { archive, target } => {
            let archive = ArchiveLayout::new(archive);
            let (root, version) = target.resolve(&archive)?;
            println!("{}", version::resolve_install_dir(&root, &version).display());
        }
        Commands::Stage {
            archive,
            target,
            identity,
        } => {
            let archive = ArchiveLayout::new(archive);
            let (root, version) = target.resolve(&archive)?;

            println!("Persisting modification...");
            println!("  Archive: {}", archive.archive().display());
            println!("  Injected files: {}", archive.current_app_dir().display());
            println!("  Version: {}", version);

            let start = Instant::now();
            let sequence = PersistSequence::system(SigningConfig { identity });
            let report = tokio::task::spawn_blocking(move || sequence.run(&archive, &root, &version))
                .await??;
            let elapsed = start.elapsed();

            println!("\nModification persisted!");
            println!("  Install dir: {}", report.install_dir.display());
            println!("  Archive renamed: {}", report.stage.archive_renamed);
            println!("  App dir created: {}", report.stage.app_dir_created);
            println!("  Files copied: {}", report.stage.files_copied);
            println!("  Bytes copied: {}", report.stage.bytes_copied);
            println!("  Signature: {:?}", report.signing);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Sign { bundle, identity } => {
            let config = SigningConfig { identity };
            let outcome = tokio::task::spawn_blocking(move || {
                signing::restore_signature(
                    &signing::Codesign::default(),
                    Platform::current(),
                    &bundle,
                    &config,
                )
            })
            .await?;
            println!("Signature: {:?}", outcome);
        }
        Commands::Verify { archive, target } => {
            let archive = ArchiveLayout::new(archive);
            let (root, version) = target.resolve(&archive)?;
            let install = InstallLayout::new(version::resolve_install_dir(&root, &version));

            let report = verify::verify_install(&archive.current_app_dir(), &install).await?;

            println!("Install dir: {}", report.install_dir.display());
            println!("  Claimed: {}", report.claimed);
            println!("  Matching: {}", report.count(FileStatus::Matching));
            println!("  Missing: {}", report.count(FileStatus::Missing));
            println!("  Differs: {}", report.count(FileStatus::Differs));
            for (name, status) in &report.files {
                if *status != FileStatus::Matching {
                    println!("    {}: {status:?}", name.to_string_lossy());
                }
            }

            if !report.is_persisted() {
                bail!("Modification is not persisted in {}", report.install_dir.display());
            }
        }
    }

    Ok(())
}
