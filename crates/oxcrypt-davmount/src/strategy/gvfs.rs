//! GNOME virtual filesystem strategy (Linux).
//!
//! Mounts through gvfs so the volume shows up in the desktop's file manager
//! without root privileges. gvfs expects its own scheme names (`dav`,
//! `davs`) rather than `http`/`https`, so the URI is rewritten first and the
//! rewritten URI identifies the mount from then on.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tracing::instrument;
use url::{Position, Url};

use super::MountStrategy;
use crate::error::MountError;
use crate::handle::{LivenessProbe, Mount, MountLocator};
use crate::host::{HostInfo, OsFamily};
use crate::params::{MountParam, MountParams};
use crate::process::{BoundedCommand, Cancellation};

/// Scheme used when [`MountParam::PreferredGvfsScheme`] is not set.
pub const DEFAULT_GVFS_SCHEME: &str = "dav";

/// Bound for looking up the gvfs CLI on `PATH`.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound for mount, unmount, list and open commands.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// KDE ships a gvfs integration that cannot mount WebDAV this way
/// (cryptomator/cryptomator#1381).
const INCOMPATIBLE_DESKTOP: &str = "KDE";

/// A command-line front end to gvfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GvfsCli {
    /// `gio mount` / `gio open` (GLib 2.50 and later)
    Gio {
        /// Path or name of the `gio` binary
        gio: PathBuf,
    },
    /// The deprecated `gvfs-mount` / `gvfs-open` pair
    Legacy {
        /// Path or name of `gvfs-mount`
        mount: PathBuf,
        /// Path or name of `gvfs-open`
        open: PathBuf,
    },
}

impl GvfsCli {
    /// `gio`, looked up on `PATH`.
    pub fn gio() -> Self {
        GvfsCli::Gio {
            gio: PathBuf::from("gio"),
        }
    }

    /// `gvfs-mount` and `gvfs-open`, looked up on `PATH`.
    pub fn legacy() -> Self {
        GvfsCli::Legacy {
            mount: PathBuf::from("gvfs-mount"),
            open: PathBuf::from("gvfs-open"),
        }
    }

    fn mount_program(&self) -> &Path {
        match self {
            GvfsCli::Gio { gio } => gio,
            GvfsCli::Legacy { mount, .. } => mount,
        }
    }

    /// Whether the CLI can be found, checked with `command -v` within a short
    /// bound. The program name is passed as a positional parameter, never
    /// spliced into the script.
    pub fn is_installed(&self) -> bool {
        let program = self.mount_program();
        let found = BoundedCommand::new("sh", PROBE_TIMEOUT)
            .args(["-c", r#"command -v "$1""#, "sh"])
            .arg(program)
            .run()
            .and_then(|output| output.assert_success(0));
        match found {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!("{} not usable: {}", program.display(), e);
                false
            }
        }
    }

    fn mount_command(&self, uri: &Url) -> BoundedCommand {
        self.mount_base().arg(uri.as_str())
    }

    fn unmount_command(&self, uri: &Url) -> BoundedCommand {
        self.mount_base().arg("-u").arg(uri.as_str())
    }

    fn list_command(&self) -> BoundedCommand {
        match self {
            GvfsCli::Gio { .. } => self.mount_base().arg("-l"),
            GvfsCli::Legacy { .. } => self.mount_base().arg("--list"),
        }
    }

    fn open_command(&self, uri: &Url) -> BoundedCommand {
        let open = match self {
            GvfsCli::Gio { gio } => BoundedCommand::new(gio, COMMAND_TIMEOUT).arg("open"),
            GvfsCli::Legacy { open, .. } => BoundedCommand::new(open, COMMAND_TIMEOUT),
        };
        open.arg(uri.as_str())
    }

    fn mount_base(&self) -> BoundedCommand {
        match self {
            GvfsCli::Gio { gio } => BoundedCommand::new(gio, COMMAND_TIMEOUT).arg("mount"),
            GvfsCli::Legacy { mount, .. } => BoundedCommand::new(mount, COMMAND_TIMEOUT),
        }
    }
}

/// Mounts via gvfs on Linux desktops.
#[derive(Debug)]
pub struct GvfsMounter {
    primary: GvfsCli,
    fallbacks: Vec<GvfsCli>,
    installed: OnceLock<Option<GvfsCli>>,
}

impl GvfsMounter {
    /// Prefer `gio`, fall back to the legacy `gvfs-*` tools.
    pub fn new() -> Self {
        Self {
            primary: GvfsCli::gio(),
            fallbacks: vec![GvfsCli::legacy()],
            installed: OnceLock::new(),
        }
    }

    /// Use exactly `cli`.
    pub fn with_cli(cli: GvfsCli) -> Self {
        Self {
            primary: cli,
            fallbacks: Vec::new(),
            installed: OnceLock::new(),
        }
    }

    /// The first installed CLI, probed once and cached.
    fn installed_cli(&self) -> Option<&GvfsCli> {
        self.installed
            .get_or_init(|| {
                std::iter::once(&self.primary)
                    .chain(&self.fallbacks)
                    .find(|cli| cli.is_installed())
                    .cloned()
            })
            .as_ref()
    }
}

impl Default for GvfsMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl MountStrategy for GvfsMounter {
    fn id(&self) -> &'static str {
        "gvfs"
    }

    fn display_name(&self) -> &'static str {
        "GNOME Virtual File System"
    }

    fn is_applicable(&self, host: &HostInfo) -> bool {
        if host.os != OsFamily::Linux {
            return false;
        }
        if host.is_desktop(INCOMPATIBLE_DESKTOP) {
            tracing::debug!("gvfs mounting disabled on {}", INCOMPATIBLE_DESKTOP);
            return false;
        }
        self.installed_cli().is_some()
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    fn mount_cancellable(
        &self,
        uri: &Url,
        params: &MountParams,
        cancel: &Cancellation,
    ) -> Result<Mount, MountError> {
        // Not installed: run the primary anyway so the spawn error surfaces.
        let cli = self.installed_cli().unwrap_or(&self.primary);

        let scheme = params.get_or(MountParam::PreferredGvfsScheme, DEFAULT_GVFS_SCHEME);
        let derived = with_scheme(uri, scheme)?;

        cli.mount_command(&derived)
            .run_cancellable(cancel)?
            .assert_success(0)?;
        tracing::debug!("Mounted {}", derived);

        let probe = LivenessProbe::new(cli.list_command(), derived.as_str());
        Ok(Mount::new(
            MountLocator::Uri(derived.clone()),
            cli.open_command(&derived),
            cli.unmount_command(&derived),
        )
        .with_liveness_probe(probe))
    }
}

/// Replace the scheme of `uri`, keeping the scheme-specific part (authority,
/// path and query) unchanged and dropping any fragment.
///
/// An explicit port equal to the new scheme's default port is normalized
/// away (`http://h:443/` with `https` becomes `https://h/`); the effective
/// port stays the same.
///
/// # Errors
///
/// [`MountError::InvalidParam`] if `scheme` is not a syntactically valid URI
/// scheme, or is a special scheme (e.g. `file`) whose authority rules the
/// original URI does not satisfy.
///
/// # Panics
///
/// If the rewritten URI with a non-special scheme fails to parse. The
/// authority of an already parsed URI is always a valid opaque host, so
/// this indicates a bug.
pub fn with_scheme(uri: &Url, scheme: &str) -> Result<Url, MountError> {
    let invalid = |reason| MountError::InvalidParam {
        param: MountParam::PreferredGvfsScheme.to_string(),
        value: scheme.to_string(),
        reason,
    };
    if !is_valid_scheme(scheme) {
        return Err(invalid("not a valid URI scheme"));
    }

    let scheme_specific_part = &uri[Position::AfterScheme..Position::AfterQuery];
    let rewritten = format!("{scheme}{scheme_specific_part}");
    match Url::parse(&rewritten) {
        Ok(derived) => Ok(derived),
        Err(e) if is_special_scheme(scheme) => {
            tracing::debug!("{} rejected by scheme {}: {}", uri, scheme, e);
            Err(invalid("scheme cannot address this URI's host and port"))
        }
        Err(e) => panic!("URI {rewritten:?} constructed from elements known to be valid: {e}"),
    }
}

/// Schemes the URL standard gives their own host and port rules.
fn is_special_scheme(scheme: &str) -> bool {
    ["http", "https", "ws", "wss", "ftp", "file"]
        .iter()
        .any(|special| scheme.eq_ignore_ascii_case(special))
}

/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )` (RFC 3986, section 3.1)
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rewrites_scheme_only() {
        let uri = Url::parse("http://localhost:42427/a1b2c3/Tresor/").unwrap();
        let derived = with_scheme(&uri, "dav").unwrap();
        assert_eq!(derived.as_str(), "dav://localhost:42427/a1b2c3/Tresor/");
    }

    #[test]
    fn keeps_query_and_drops_fragment() {
        let uri = Url::parse("https://user@example.com:8443/dav/vault?x=1#top").unwrap();
        let derived = with_scheme(&uri, "davs").unwrap();
        assert_eq!(derived.as_str(), "davs://user@example.com:8443/dav/vault?x=1");
    }

    #[test]
    fn rejects_invalid_schemes() {
        let uri = Url::parse("http://localhost/").unwrap();
        for bad in ["", "1dav", "da v", "dav:", "dav/"] {
            let err = with_scheme(&uri, bad).unwrap_err();
            assert!(matches!(err, MountError::InvalidParam { .. }), "{bad:?}: {err:?}");
        }
    }

    #[test]
    fn non_linux_hosts_are_rejected_without_probing() {
        let mounter = GvfsMounter::with_cli(GvfsCli::Gio {
            gio: PathBuf::from("/nonexistent/gio"),
        });
        assert!(!mounter.is_applicable(&HostInfo::new(OsFamily::MacOs)));
        assert!(!mounter.is_applicable(&HostInfo::new(OsFamily::Windows)));
        assert!(mounter.installed.get().is_none());
    }

    #[test]
    fn missing_cli_is_not_applicable() {
        let mounter = GvfsMounter::with_cli(GvfsCli::Gio {
            gio: PathBuf::from("/nonexistent/gio"),
        });
        assert!(!mounter.is_applicable(&HostInfo::new(OsFamily::Linux)));
    }

    #[cfg(unix)]
    #[test]
    fn kde_is_excluded_even_with_cli_installed() {
        // `sh` stands in for an installed gvfs CLI
        let mounter = GvfsMounter::with_cli(GvfsCli::Gio {
            gio: PathBuf::from("sh"),
        });
        let gnome = HostInfo::new(OsFamily::Linux).with_desktop("GNOME");
        let kde = HostInfo::new(OsFamily::Linux).with_desktop("KDE");
        assert!(mounter.is_applicable(&gnome));
        assert!(!mounter.is_applicable(&kde));
    }

    #[test]
    fn command_lines_per_cli() {
        let uri = Url::parse("dav://localhost:42427/vault/").unwrap();

        let gio = GvfsCli::gio();
        assert_eq!(gio.mount_command(&uri).to_string(), "gio mount dav://localhost:42427/vault/");
        assert_eq!(gio.unmount_command(&uri).to_string(), "gio mount -u dav://localhost:42427/vault/");
        assert_eq!(gio.list_command().to_string(), "gio mount -l");
        assert_eq!(gio.open_command(&uri).to_string(), "gio open dav://localhost:42427/vault/");

        let legacy = GvfsCli::legacy();
        assert_eq!(legacy.mount_command(&uri).to_string(), "gvfs-mount dav://localhost:42427/vault/");
        assert_eq!(legacy.unmount_command(&uri).to_string(), "gvfs-mount -u dav://localhost:42427/vault/");
        assert_eq!(legacy.list_command().to_string(), "gvfs-mount --list");
        assert_eq!(legacy.open_command(&uri).to_string(), "gvfs-open dav://localhost:42427/vault/");
    }

    #[test]
    fn special_scheme_rejecting_authority_is_invalid_param() {
        let uri = Url::parse("http://localhost:42427/vault/").unwrap();
        match with_scheme(&uri, "file") {
            Err(MountError::InvalidParam { param, value, .. }) => {
                assert_eq!(param, "preferred-gvfs-scheme");
                assert_eq!(value, "file");
            }
            other => panic!("expected InvalidParam, got {other:?}"),
        }
    }

    #[test]
    fn mount_with_unusable_scheme_is_an_error() {
        let mounter = GvfsMounter::with_cli(GvfsCli::Gio {
            gio: PathBuf::from("/nonexistent/gio"),
        });
        let uri = Url::parse("http://localhost:42427/vault/").unwrap();
        let params = MountParams::new().with(MountParam::PreferredGvfsScheme, "file");
        let err = mounter.mount(&uri, &params).unwrap_err();
        assert!(matches!(err, MountError::InvalidParam { .. }), "{err:?}");
    }

    #[test]
    fn default_port_of_new_scheme_is_normalized() {
        let uri = Url::parse("http://localhost:443/vault/").unwrap();
        let derived = with_scheme(&uri, "https").unwrap();
        assert_eq!(derived.as_str(), "https://localhost/vault/");
        assert_eq!(derived.port_or_known_default(), uri.port());
    }

    proptest! {
        #[test]
        fn derived_uri_differs_only_in_scheme(
            host in "[a-z][a-z0-9]{0,10}",
            port in 1024u16..,
            segments in proptest::collection::vec("[a-zA-Z0-9_-]{1,8}", 0..4),
            scheme in "[a-z][a-z0-9+.-]{0,6}",
        ) {
            let original = format!("http://{host}:{port}/{}", segments.join("/"));
            let uri = Url::parse(&original).unwrap();

            match with_scheme(&uri, &scheme) {
                Ok(derived) => {
                    prop_assert_eq!(derived.scheme(), scheme.as_str());
                    prop_assert_eq!(
                        &derived[Position::AfterScheme..],
                        &uri[Position::AfterScheme..]
                    );
                }
                // file URLs cannot carry a port
                Err(MountError::InvalidParam { .. }) => prop_assert_eq!(scheme.as_str(), "file"),
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }
    }
}
