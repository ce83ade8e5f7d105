//! Keeps a modification's injected files alive across a host app's self-update.
//!
//! When the host announces `host-updated`, the new `app-<version>` directory is
//! resolved, its `app.asar` is renamed out of the way, the injected files are
//! copied into `resources/app`, and on macOS the bundle signature is repaired.

pub mod fs_ops;
pub mod hook;
pub mod logging;
pub mod paths;
pub mod sequence;
pub mod signing;
pub mod stage;
pub mod util;
pub mod verify;
pub mod version;

pub use hook::{install_persistence, persist, Updater, UpdaterLocator, UpdaterState, HOST_UPDATED_EVENT};
pub use paths::{ArchiveLayout, InstallLayout};
pub use sequence::{PersistReport, PersistSequence};
pub use signing::{CodeSigner, Codesign, Platform, SignOutcome, SigningConfig};
pub use version::{HostVersions, VersionTuple};
