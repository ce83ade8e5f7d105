//! Interception of the host updater's event dispatch.
//!
//! The host's dispatch function is owned by an [`Updater`]. Installing the
//! persistence hook moves that function into a [`PersistingEmit`] wrapper and
//! puts the wrapper in its place, so every later `emit` goes through it.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::paths::ArchiveLayout;
use crate::sequence::{PersistReport, PersistSequence};
use crate::version::HostVersions;

/// Event the host emits once it has finished staging a new version.
pub const HOST_UPDATED_EVENT: &str = "host-updated";

/// Updater state read by the hook while handling [`HOST_UPDATED_EVENT`].
pub trait UpdaterState {
    /// Directory holding the versioned `app-*` installs.
    fn root_path(&self) -> &Path;
    fn query_current_versions(&self) -> Result<HostVersions>;
}

/// A host dispatch function. It receives the updater state the way a method receives `self`.
pub type EmitFn<S, A, R> = Box<dyn FnMut(&S, &str, A) -> Result<R>>;

pub struct Updater<S, A, R> {
    state: S,
    emit: EmitFn<S, A, R>,
    persistence_hooked: bool,
}

impl<S, A, R> Updater<S, A, R> {
    pub fn new(state: S, emit: impl FnMut(&S, &str, A) -> Result<R> + 'static) -> Self {
        Self {
            state,
            emit: Box::new(emit),
            persistence_hooked: false,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn is_persistence_hooked(&self) -> bool {
        self.persistence_hooked
    }

    pub fn emit(&mut self, event: &str, args: A) -> Result<R> {
        (self.emit)(&self.state, event, args)
    }
}

/// Dispatch wrapper that persists the modification before forwarding `host-updated`.
pub struct PersistingEmit<S, A, R> {
    original: EmitFn<S, A, R>,
    archive: ArchiveLayout,
    sequence: PersistSequence,
}

impl<S: UpdaterState, A, R> PersistingEmit<S, A, R> {
    pub fn new(original: EmitFn<S, A, R>, archive: ArchiveLayout, sequence: PersistSequence) -> Self {
        Self {
            original,
            archive,
            sequence,
        }
    }

    /// Forwards every event to the original dispatch. For `host-updated` the
    /// persistence sequence runs to completion first; the original dispatch
    /// still runs if it fails, and the persistence error is what gets returned.
    pub fn emit(&mut self, state: &S, event: &str, args: A) -> Result<R> {
        if event != HOST_UPDATED_EVENT {
            return (self.original)(state, event, args);
        }

        let persisted = self.persist(state);
        let dispatched = (self.original)(state, event, args);

        match persisted {
            Ok(report) => {
                debug!(?report, "persistence finished, host update handling continues");
                dispatched
            }
            Err(err) => {
                if let Err(dispatch_err) = &dispatched {
                    error!("host dispatch also failed: {dispatch_err:#}");
                }
                Err(err)
            }
        }
    }

    fn persist(&self, state: &S) -> Result<PersistReport> {
        let versions = state
            .query_current_versions()
            .context("Failed to query current host versions")?;
        self.sequence
            .run(&self.archive, state.root_path(), &versions.current_host)
            .context("Failed to persist modification into updated host")
    }
}

fn detached_emit<S, A, R>(_: &S, event: &str, _: A) -> Result<R> {
    bail!("updater dispatch for '{event}' is detached")
}

/// Swap the updater's dispatch for a [`PersistingEmit`] around it.
/// Returns `false` without touching anything if this updater was already hooked.
pub fn install_persistence<S, A, R>(
    updater: &mut Updater<S, A, R>,
    archive: ArchiveLayout,
    sequence: PersistSequence,
) -> bool
where
    S: UpdaterState + 'static,
    A: 'static,
    R: 'static,
{
    if updater.persistence_hooked {
        debug!("updater already hooked for persistence");
        return false;
    }

    let detached: EmitFn<S, A, R> = Box::new(detached_emit::<S, A, R>);
    let original = std::mem::replace(&mut updater.emit, detached);
    let mut wrapper = PersistingEmit::new(original, archive, sequence);
    updater.emit = Box::new(move |state: &S, event: &str, args: A| wrapper.emit(state, event, args));
    updater.persistence_hooked = true;

    info!(root = %updater.state.root_path().display(), "hooked host updater for persistence");
    true
}

/// Finds the host updater belonging to a running archive.
pub trait UpdaterLocator {
    type State: UpdaterState + 'static;
    type Args: 'static;
    type Output: 'static;

    fn locate(
        &mut self,
        archive: &Path,
    ) -> Result<&mut Updater<Self::State, Self::Args, Self::Output>>;
}

/// Hook the host updater so the modification survives the next host update.
///
/// Installation failures are logged and swallowed; the host keeps starting
/// without persistence. Returns whether a hook was installed.
pub fn persist<L: UpdaterLocator>(
    locator: &mut L,
    archive_path: &Path,
    sequence: PersistSequence,
) -> bool {
    match hook_updater(locator, archive_path, sequence) {
        Ok(installed) => installed,
        Err(err) => {
            error!("failed to set up persistence: {err:#}");
            false
        }
    }
}

fn hook_updater<L: UpdaterLocator>(
    locator: &mut L,
    archive_path: &Path,
    sequence: PersistSequence,
) -> Result<bool> {
    let updater = locator
        .locate(archive_path)
        .with_context(|| format!("Failed to locate host updater for {}", archive_path.display()))?;
    Ok(install_persistence(
        updater,
        ArchiveLayout::new(PathBuf::from(archive_path)),
        sequence,
    ))
}
