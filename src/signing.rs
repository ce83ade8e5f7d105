//! Bundle code-signature repair after the install tree has been modified.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SIGN_IDENTITY: &str = "moonlight";
pub const SIGN_VERBOSITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub verbosity_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOptions {
    pub deep: bool,
    pub force: bool,
    pub identity: String,
    pub verbosity_level: u8,
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing tool '{tool}' not found")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },
    #[error("failed to run '{tool}'")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{tool}' exited with {status}: {stderr}")]
    Failed {
        tool: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// Platform verify/sign operations on an application bundle.
pub trait CodeSigner: Send + Sync {
    /// `Ok(true)` when the bundle currently passes signature validation.
    fn verify(&self, bundle: &Path, options: &VerifyOptions) -> Result<bool, SignError>;
    fn sign(&self, bundle: &Path, options: &SignOptions) -> Result<(), SignError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }

    /// Whether the OS refuses to run bundles with a broken signature.
    pub fn enforces_code_signing(self) -> bool {
        matches!(self, Platform::MacOs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    pub identity: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_SIGN_IDENTITY.to_string(),
        }
    }
}

impl SigningConfig {
    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            verbosity_level: SIGN_VERBOSITY,
        }
    }

    pub fn sign_options(&self) -> SignOptions {
        SignOptions {
            deep: true,
            force: true,
            identity: self.identity.clone(),
            verbosity_level: SIGN_VERBOSITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// Signing is not enforced on this platform; nothing was checked.
    NotApplicable,
    /// The bundle was still valid, so it was left alone.
    AlreadyValid,
    Resigned,
    /// Signing did not produce a valid bundle. The app may refuse to launch.
    StillInvalid,
}

/// Verify the bundle and re-sign it only if verification fails.
///
/// Never returns an error: tool failures are logged and reported through the outcome.
pub fn restore_signature(
    signer: &dyn CodeSigner,
    platform: Platform,
    bundle: &Path,
    config: &SigningConfig,
) -> SignOutcome {
    if !platform.enforces_code_signing() {
        warn!(
            bundle = %bundle.display(),
            "skipping code signing, not enforced on this platform"
        );
        return SignOutcome::NotApplicable;
    }

    debug!(bundle = %bundle.display(), "inferred bundle path");
    let verify_options = config.verify_options();

    if probe(signer, bundle, &verify_options) {
        warn!("bundle still passes code signing, no need to sign");
        return SignOutcome::AlreadyValid;
    }
    debug!("bundle no longer passes code signing (expected after staging)");

    if let Err(err) = signer.sign(bundle, &config.sign_options()) {
        error!(error = %err, bundle = %bundle.display(), "signing failed");
    }

    if probe(signer, bundle, &verify_options) {
        info!(bundle = %bundle.display(), "bundle signed successfully");
        SignOutcome::Resigned
    } else {
        error!(
            bundle = %bundle.display(),
            "bundle fails code signing even after signing, the app might not launch"
        );
        SignOutcome::StillInvalid
    }
}

fn probe(signer: &dyn CodeSigner, bundle: &Path, options: &VerifyOptions) -> bool {
    match signer.verify(bundle, options) {
        Ok(valid) => valid,
        Err(err) => {
            warn!(error = %err, "signature verification could not run, treating bundle as invalid");
            false
        }
    }
}

/// The macOS `codesign` tool, looked up on `PATH` at call time.
#[derive(Debug, Clone)]
pub struct Codesign {
    program: OsString,
}

impl Default for Codesign {
    fn default() -> Self {
        Self::with_program("codesign")
    }
}

impl Codesign {
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn resolve(&self) -> Result<PathBuf, SignError> {
        which::which(&self.program).map_err(|source| SignError::ToolNotFound {
            tool: self.program.to_string_lossy().into_owned(),
            source,
        })
    }

    fn run(&self, args: Vec<OsString>) -> Result<(PathBuf, std::process::Output), SignError> {
        let tool = self.resolve()?;
        debug!(tool = %tool.display(), ?args, "running signing tool");
        let output = Command::new(&tool)
            .args(&args)
            .output()
            .map_err(|source| SignError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        Ok((tool, output))
    }
}

fn verbosity_arg(level: u8) -> OsString {
    format!("--verbose={level}").into()
}

impl CodeSigner for Codesign {
    fn verify(&self, bundle: &Path, options: &VerifyOptions) -> Result<bool, SignError> {
        let args = vec![
            "--verify".into(),
            verbosity_arg(options.verbosity_level),
            bundle.as_os_str().to_owned(),
        ];
        let (_, output) = self.run(args)?;
        debug!(
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            valid = output.status.success(),
            "verified bundle"
        );
        Ok(output.status.success())
    }

    fn sign(&self, bundle: &Path, options: &SignOptions) -> Result<(), SignError> {
        let mut args: Vec<OsString> = vec!["--sign".into(), options.identity.clone().into()];
        if options.deep {
            args.push("--deep".into());
        }
        if options.force {
            args.push("--force".into());
        }
        args.push(verbosity_arg(options.verbosity_level));
        args.push(bundle.as_os_str().to_owned());

        let (tool, output) = self.run(args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SignError::Failed {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
