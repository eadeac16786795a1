//! Handle to an established mount.
//!
//! There is a single concrete [`Mount`] type for every strategy. What differs
//! between strategies is captured by data, not by subtyping:
//!
//! - the [`MountLocator`] (derived URI for gvfs, mount point for macOS)
//! - the prepared reveal and unmount commands
//! - an optional [`LivenessProbe`] (URI-addressed mounts only)
//!
//! # Lifecycle
//!
//! ```text
//! Mounted ──unmount()──▶ Unmounted (terminal)
//!    │
//!    └─reveal()─┐ (any number of times, no state change)
//!       ▲───────┘
//! ```
//!
//! Dropping a `Mount` leaves the volume mounted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::instrument;
use url::Url;

use crate::error::MountError;
use crate::process::BoundedCommand;

/// What identifies a mount to the OS tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountLocator {
    /// Addressed by the (derived) URI it was mounted from
    Uri(Url),
    /// Addressed by its mount point directory
    Path(PathBuf),
}

impl fmt::Display for MountLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountLocator::Uri(uri) => f.write_str(uri.as_str()),
            MountLocator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Lifecycle state of a [`Mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    /// The volume is (as far as we know) attached
    Mounted,
    /// `unmount()` succeeded; terminal
    Unmounted,
}

/// Checks whether a URI-addressed mount is still listed by the OS tooling.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    listing: BoundedCommand,
    needle: String,
}

impl LivenessProbe {
    /// The mount counts as live when `listing` exits 0 and exactly one line of
    /// its output contains `needle`.
    pub(crate) fn new(listing: BoundedCommand, needle: impl Into<String>) -> Self {
        Self {
            listing,
            needle: needle.into(),
        }
    }

    /// Run the probe. Any failure (timeout, non-zero exit) counts as not live.
    pub fn check(&self) -> bool {
        let output = match self.listing.run() {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("Liveness check failed: {}", e);
                return false;
            }
        };
        if output.assert_success(0).is_err() {
            return false;
        }
        output.stdout().is_some_and(|stdout| {
            stdout
                .lines()
                .filter(|line| line.contains(&self.needle))
                .count()
                == 1
        })
    }
}

/// One established mount.
///
/// Only mount strategies construct this, and only after the mount was
/// confirmed. Callers cannot fabricate a handle:
///
/// ```compile_fail
/// use std::path::PathBuf;
/// use std::time::Duration;
/// use oxcrypt_davmount::{BoundedCommand, Mount, MountLocator};
///
/// let noop = BoundedCommand::new("true", Duration::from_secs(1));
/// let _mount = Mount::new(
///     MountLocator::Path(PathBuf::from("/Volumes/vault")),
///     noop.clone(),
///     noop,
/// );
/// ```
#[derive(Debug)]
pub struct Mount {
    locator: MountLocator,
    reveal_command: BoundedCommand,
    unmount_command: BoundedCommand,
    liveness: Option<LivenessProbe>,
    state: MountState,
}

impl Mount {
    /// Create a handle in the `Mounted` state.
    pub(crate) fn new(
        locator: MountLocator,
        reveal_command: BoundedCommand,
        unmount_command: BoundedCommand,
    ) -> Self {
        Self {
            locator,
            reveal_command,
            unmount_command,
            liveness: None,
            state: MountState::Mounted,
        }
    }

    /// Attach a liveness probe, enabling [`is_mounted`](Self::is_mounted).
    #[must_use]
    pub(crate) fn with_liveness_probe(mut self, probe: LivenessProbe) -> Self {
        self.liveness = Some(probe);
        self
    }

    /// How the OS tooling identifies this mount.
    pub fn locator(&self) -> &MountLocator {
        &self.locator
    }

    /// The mount point, for path-addressed mounts.
    pub fn mount_point(&self) -> Option<&Path> {
        match &self.locator {
            MountLocator::Path(path) => Some(path),
            MountLocator::Uri(_) => None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Open the mount in the host's file manager.
    ///
    /// # Errors
    ///
    /// [`MountError::NotMounted`] after a successful unmount, otherwise any
    /// failure of the reveal command.
    pub fn reveal(&self) -> Result<(), MountError> {
        if self.state == MountState::Unmounted {
            return Err(MountError::NotMounted);
        }
        self.reveal_command.run()?.assert_success(0)?;
        tracing::debug!("Revealed {}", self.locator);
        Ok(())
    }

    /// Detach the volume.
    ///
    /// Path-addressed mounts whose mount point no longer exists are treated as
    /// already unmounted (the OS removes the directory on unmount) and no
    /// command is run. After a successful unmount the now-empty mount point is
    /// removed on a best-effort basis.
    ///
    /// Calling this on an unmounted handle is a no-op. On failure the handle
    /// stays `Mounted` so the caller may retry.
    #[instrument(level = "debug", skip_all, fields(locator = %self.locator))]
    pub fn unmount(&mut self) -> Result<(), MountError> {
        if self.state == MountState::Unmounted {
            tracing::debug!("Already unmounted");
            return Ok(());
        }

        if let MountLocator::Path(path) = &self.locator
            && !path.is_dir()
        {
            tracing::debug!("Volume already unmounted");
            self.state = MountState::Unmounted;
            return Ok(());
        }

        self.unmount_command.run()?.assert_success(0)?;
        self.state = MountState::Unmounted;
        tracing::debug!("Unmounted {}", self.locator);

        if let MountLocator::Path(path) = &self.locator {
            remove_mount_point(path);
        }
        Ok(())
    }

    /// Whether the mount is still active.
    ///
    /// `None` if this handle has no way to tell (path-addressed mounts).
    pub fn is_mounted(&self) -> Option<bool> {
        if self.state == MountState::Unmounted {
            return Some(false);
        }
        self.liveness.as_ref().map(LivenessProbe::check)
    }
}

fn remove_mount_point(path: &Path) {
    match fs::remove_dir(path) {
        Ok(()) => tracing::debug!("Removed mount point {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not delete mount point {}: {}", path.display(), e),
    }
}
