//! Mount a WebDAV URI as a local volume using the host's native tooling.
//!
//! The WebDAV server that unlocks a Cryptomator vault only gives us a URI.
//! This crate turns that URI into something the user can browse in their file
//! manager, without committing to any single OS mounting mechanism.
//!
//! # Components
//!
//! - [`BoundedCommand`] - runs an external tool with a hard timeout, killing
//!   it (and anything it forked) when the bound elapses or the caller cancels
//! - [`StrategySelector`] - probes the [`HostInfo`] and picks the first
//!   applicable [`MountStrategy`]
//! - [`GvfsMounter`] / [`AppleScriptMounter`] - the built-in strategies
//! - [`Mount`] - handle to an established mount: reveal, unmount, liveness
//!
//! # Example
//!
//! ```no_run
//! use oxcrypt_davmount::{MountParam, MountParams, StrategySelector};
//! use url::Url;
//!
//! let uri = Url::parse("http://localhost:42427/a1b2c3/Tresor/")?;
//! let params = MountParams::new().with(MountParam::PreferredGvfsScheme, "dav");
//!
//! let selector = StrategySelector::new();
//! let strategy = selector.select().ok_or("no way to mount on this host")?;
//!
//! let mut mount = strategy.mount(&uri, &params)?;
//! mount.reveal()?;
//! // ... later
//! mount.unmount()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod handle;
mod host;
mod params;
pub mod process;
pub mod strategy;

pub use error::{FailureDetail, MountError};
pub use handle::{LivenessProbe, Mount, MountLocator, MountState};
pub use host::{HostInfo, OsFamily, OsVersion, detect_host};
pub use params::{MountParam, MountParams, ParamParseError};
pub use process::{BoundedCommand, Cancellation, ExecutionOutput, capture_text};
pub use strategy::{
    AppleScriptMounter, GvfsCli, GvfsMounter, MacTools, MountStrategy, StrategyInfo,
    StrategySelector, default_strategies,
};
