//! AppleScript strategy (macOS).
//!
//! Asks Finder to `mount volume` the URI, then finds the resulting mount
//! point in the `mount` listing. The mount call may block on a dialog asking
//! the user to confirm connecting over plain HTTP, hence the long timeout.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::instrument;
use url::Url;

use super::MountStrategy;
use crate::error::{FailureDetail, MountError};
use crate::handle::{Mount, MountLocator};
use crate::host::{HostInfo, OsFamily, OsVersion};
use crate::params::MountParams;
use crate::process::{BoundedCommand, Cancellation};

/// Oldest macOS release whose `mount volume` handles WebDAV URIs.
pub const MIN_MACOS_VERSION: OsVersion = OsVersion::new(10, 10, 0);

/// Generous, since the user may have to confirm a connection dialog.
const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

const REVEAL_TIMEOUT: Duration = Duration::from_secs(10);

const UNMOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// `<label> on <mount point> (<options>)`, e.g.
/// `http://localhost:42427/vault/ on /Volumes/vault (webdav, nodev, noexec, nosuid)`
static MOUNT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+? on (.+) \([^()]*\)$").expect("mount line pattern is valid")
});

/// Locations of the macOS tools used by [`AppleScriptMounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacTools {
    /// AppleScript interpreter
    pub osascript: PathBuf,
    /// Mount table listing
    pub mount: PathBuf,
    /// Volume unmount utility
    pub diskutil: PathBuf,
    /// Finder launcher
    pub open: PathBuf,
}

impl Default for MacTools {
    fn default() -> Self {
        Self {
            osascript: PathBuf::from("/usr/bin/osascript"),
            mount: PathBuf::from("/sbin/mount"),
            diskutil: PathBuf::from("/usr/sbin/diskutil"),
            open: PathBuf::from("/usr/bin/open"),
        }
    }
}

/// Mounts via AppleScript's `mount volume` on macOS.
#[derive(Debug, Default)]
pub struct AppleScriptMounter {
    tools: MacTools,
}

impl AppleScriptMounter {
    /// Use the system tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given tool locations.
    pub fn with_tools(tools: MacTools) -> Self {
        Self { tools }
    }
}

impl MountStrategy for AppleScriptMounter {
    fn id(&self) -> &'static str {
        "applescript"
    }

    fn display_name(&self) -> &'static str {
        "AppleScript (Finder)"
    }

    fn is_applicable(&self, host: &HostInfo) -> bool {
        host.os == OsFamily::MacOs
            && host
                .parsed_os_version()
                .is_some_and(|version| version >= MIN_MACOS_VERSION)
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    fn mount_cancellable(
        &self,
        uri: &Url,
        _params: &MountParams,
        cancel: &Cancellation,
    ) -> Result<Mount, MountError> {
        let script = format!(
            r#"mount volume "{}" as user name "anonymous" with password """#,
            escape_applescript(uri.as_str())
        );
        BoundedCommand::new(&self.tools.osascript, MOUNT_TIMEOUT)
            .arg("-e")
            .arg(script)
            .run_cancellable(cancel)?
            .assert_success(0)?;

        let listing = BoundedCommand::new(&self.tools.mount, VERIFY_TIMEOUT).run_cancellable(cancel)?;
        listing.assert_success(0)?;

        let stdout = listing.stdout().unwrap_or_default();
        let ours: Vec<&str> = stdout
            .lines()
            .filter(|line| line.contains(uri.as_str()))
            .collect();

        let Some(mount_point) = parse_mount_point(&ours.join("\n")) else {
            return Err(MountError::CommandFailed {
                command: listing.command().to_string(),
                detail: FailureDetail::Unverified(stdout.to_string()),
            });
        };
        tracing::debug!("Mounted {} on {}.", uri, mount_point.display());

        let reveal = BoundedCommand::new(&self.tools.open, REVEAL_TIMEOUT).arg(&mount_point);
        let unmount = BoundedCommand::new(&self.tools.diskutil, UNMOUNT_TIMEOUT)
            .arg("umount")
            .arg(&mount_point);
        Ok(Mount::new(MountLocator::Path(mount_point), reveal, unmount))
    }
}

/// Extract the mount point from the first line of `listing` shaped like
/// `<label> on <mount point> (<options>)`.
pub fn parse_mount_point(listing: &str) -> Option<PathBuf> {
    listing.lines().find_map(|line| {
        MOUNT_LINE
            .captures(line.trim_end())
            .map(|caps| PathBuf::from(&caps[1]))
    })
}

/// Escape `value` for use inside an AppleScript string literal.
fn escape_applescript(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"")
}
