//! Mount strategies and the selector that picks one for the current host.
//!
//! # Architecture
//!
//! - [`MountStrategy`]: one OS/tooling combination able to mount a WebDAV URI
//! - [`StrategySelector`]: asks each registered strategy, in priority order,
//!   whether it applies to the detected [`HostInfo`], and returns the first
//!   that does
//!
//! The default priority order is:
//!
//! 1. [`GvfsMounter`] - GNOME virtual filesystem (`gio` / `gvfs-mount`), Linux
//! 2. [`AppleScriptMounter`] - Finder's `mount volume`, macOS 10.10+
//!
//! # Example
//!
//! ```no_run
//! use oxcrypt_davmount::{MountParams, StrategySelector};
//! use url::Url;
//!
//! let selector = StrategySelector::new();
//! if let Some(strategy) = selector.select() {
//!     let uri = Url::parse("http://localhost:42427/vault/").unwrap();
//!     let mut mount = strategy.mount(&uri, &MountParams::new()).unwrap();
//!     mount.reveal().unwrap();
//!     mount.unmount().unwrap();
//! }
//! ```

mod applescript;
mod gvfs;

pub use applescript::{AppleScriptMounter, MIN_MACOS_VERSION, MacTools, parse_mount_point};
pub use gvfs::{DEFAULT_GVFS_SCHEME, GvfsCli, GvfsMounter, with_scheme};

use url::Url;

use crate::error::MountError;
use crate::handle::Mount;
use crate::host::{HostInfo, detect_host};
use crate::params::MountParams;
use crate::process::Cancellation;

/// A way of mounting a WebDAV URI on some hosts.
///
/// # Thread Safety
///
/// Strategies must be `Send + Sync`; mounting blocks the calling thread for
/// up to the strategy's command timeouts.
pub trait MountStrategy: Send + Sync {
    /// Unique identifier, used for configuration and `--strategy` flags.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn display_name(&self) -> &'static str;

    /// Whether this strategy can work on `host`.
    ///
    /// Must not fail and must return quickly: any probe it runs is bounded
    /// to well under a second, and every probe error means `false`.
    fn is_applicable(&self, host: &HostInfo) -> bool;

    /// Mount `uri`, aborting any running tool when `cancel` is raised.
    ///
    /// Returns a handle only once the mount was confirmed.
    fn mount_cancellable(
        &self,
        uri: &Url,
        params: &MountParams,
        cancel: &Cancellation,
    ) -> Result<Mount, MountError>;

    /// Mount `uri`.
    fn mount(&self, uri: &Url, params: &MountParams) -> Result<Mount, MountError> {
        self.mount_cancellable(uri, params, &Cancellation::never())
    }
}

/// Serializable snapshot of one strategy's applicability.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StrategyInfo {
    /// Strategy identifier (e.g. "gvfs")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Whether it applies to the detected host
    pub applicable: bool,
}

/// Picks the first applicable strategy for a host.
pub struct StrategySelector {
    host: HostInfo,
    strategies: Vec<Box<dyn MountStrategy>>,
}

impl StrategySelector {
    /// Detect the host and register the default strategies.
    pub fn new() -> Self {
        Self::with_strategies(detect_host(), default_strategies())
    }

    /// Use an explicit host description and strategy list (in priority order).
    pub fn with_strategies(host: HostInfo, strategies: Vec<Box<dyn MountStrategy>>) -> Self {
        Self { host, strategies }
    }

    /// The host the selector probes against.
    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// All registered strategies, in priority order.
    pub fn strategies(&self) -> impl Iterator<Item = &dyn MountStrategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    /// The first applicable strategy, or `None` if no strategy can mount on
    /// this host.
    pub fn select(&self) -> Option<&dyn MountStrategy> {
        let selected = self.strategies().find(|s| s.is_applicable(&self.host));
        match selected {
            Some(s) => tracing::debug!("Selected mount strategy {}", s.id()),
            None => tracing::debug!("No applicable mount strategy for {:?}", self.host),
        }
        selected
    }

    /// Look up a strategy by id, regardless of applicability.
    pub fn by_id(&self, id: &str) -> Option<&dyn MountStrategy> {
        self.strategies().find(|s| s.id() == id)
    }

    /// Applicability of every registered strategy.
    pub fn strategy_info(&self) -> Vec<StrategyInfo> {
        self.strategies()
            .map(|s| StrategyInfo {
                id: s.id().to_string(),
                name: s.display_name().to_string(),
                applicable: s.is_applicable(&self.host),
            })
            .collect()
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in strategies in priority order.
pub fn default_strategies() -> Vec<Box<dyn MountStrategy>> {
    vec![
        Box::new(GvfsMounter::new()),
        Box::new(AppleScriptMounter::new()),
    ]
}
