//! Host detection for strategy applicability checks.
//!
//! Detection happens once, when a [`StrategySelector`](crate::StrategySelector)
//! is built, and the resulting [`HostInfo`] is passed explicitly to every
//! strategy. Tests fabricate a `HostInfo` instead of depending on the machine
//! they run on.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use crate::process::BoundedCommand;

/// Bound for commands run while detecting the host.
const DETECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Operating system family, as far as mounting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux (any distribution)
    Linux,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Anything else
    Other,
}

impl OsFamily {
    /// Family of the OS this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::MacOs,
            "windows" => OsFamily::Windows,
            _ => OsFamily::Other,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsFamily::Linux => "Linux",
            OsFamily::MacOs => "macOS",
            OsFamily::Windows => "Windows",
            OsFamily::Other => "other",
        })
    }
}

/// Facts about the running host that strategies base their decision on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// OS family
    pub os: OsFamily,
    /// Dotted OS version string (e.g. `"14.5"`), if known
    pub os_version: Option<String>,
    /// Value of `XDG_CURRENT_DESKTOP`, if set
    pub desktop: Option<String>,
}

impl HostInfo {
    /// A host with only the OS family known.
    pub fn new(os: OsFamily) -> Self {
        Self {
            os,
            os_version: None,
            desktop: None,
        }
    }

    /// Set the OS version string.
    #[must_use]
    pub fn with_os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }

    /// Set the desktop environment identifier.
    #[must_use]
    pub fn with_desktop(mut self, desktop: impl Into<String>) -> Self {
        self.desktop = Some(desktop.into());
        self
    }

    /// Parsed OS version; `None` if unknown or malformed.
    pub fn parsed_os_version(&self) -> Option<OsVersion> {
        self.os_version.as_deref().and_then(OsVersion::parse)
    }

    /// Whether `name` is one of the colon-separated entries of the desktop
    /// identifier (compared case-insensitively).
    pub fn is_desktop(&self, name: &str) -> bool {
        self.desktop.as_deref().is_some_and(|desktop| {
            desktop
                .split(':')
                .any(|entry| entry.trim().eq_ignore_ascii_case(name))
        })
    }
}

/// Detect the running host.
///
/// Never fails: facts that cannot be determined are left as `None`.
pub fn detect_host() -> HostInfo {
    let os = OsFamily::current();
    let os_version = match os {
        OsFamily::MacOs => macos_product_version(),
        _ => None,
    };
    let desktop = std::env::var("XDG_CURRENT_DESKTOP")
        .ok()
        .filter(|d| !d.is_empty());

    let host = HostInfo {
        os,
        os_version,
        desktop,
    };
    tracing::debug!(?host, "Detected host");
    host
}

fn macos_product_version() -> Option<String> {
    let output = BoundedCommand::new("sw_vers", DETECT_TIMEOUT)
        .arg("-productVersion")
        .run()
        .ok()?;
    output.assert_success(0).ok()?;
    let version = output.stdout()?.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// A dotted `major.minor[.patch]` OS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsVersion {
    /// Major component
    pub major: u32,
    /// Minor component (`0` if absent, as in `"11"`)
    pub minor: u32,
    /// Patch component (`0` if absent)
    pub patch: u32,
}

impl OsVersion {
    /// Create a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a dotted version such as `"10.15.7"` or `"14"`.
    ///
    /// Returns `None` for empty input, non-numeric components, more than
    /// three components, or surrounding garbage.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parse_component(parts.next()?)?;
        let minor = parts.next().map_or(Some(0), parse_component)?;
        let patch = parts.next().map_or(Some(0), parse_component)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_versions() {
        assert_eq!(OsVersion::parse("10.15.7"), Some(OsVersion::new(10, 15, 7)));
        assert_eq!(OsVersion::parse("14.5"), Some(OsVersion::new(14, 5, 0)));
        assert_eq!(OsVersion::parse("11"), Some(OsVersion::new(11, 0, 0)));
        assert_eq!(OsVersion::parse(" 13.1\n"), Some(OsVersion::new(13, 1, 0)));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", ".", "10.", ".10", "10..1", "ten.ten", "10.10-beta", "1.2.3.4", "-1.2", "+10.10"] {
            assert_eq!(OsVersion::parse(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn versions_compare_numerically() {
        let min = OsVersion::new(10, 10, 0);
        assert!(OsVersion::parse("10.9.5").unwrap() < min);
        assert!(OsVersion::parse("10.10").unwrap() >= min);
        assert!(OsVersion::parse("11.2").unwrap() > min);
    }

    #[test]
    fn desktop_matching_handles_colon_lists() {
        let host = HostInfo::new(OsFamily::Linux).with_desktop("ubuntu:GNOME");
        assert!(host.is_desktop("GNOME"));
        assert!(host.is_desktop("gnome"));
        assert!(!host.is_desktop("KDE"));
        assert!(!HostInfo::new(OsFamily::Linux).is_desktop("KDE"));
    }

    #[test]
    fn current_family_matches_target() {
        let family = OsFamily::current();
        if cfg!(target_os = "linux") {
            assert_eq!(family, OsFamily::Linux);
        } else if cfg!(target_os = "macos") {
            assert_eq!(family, OsFamily::MacOs);
        }
    }

    #[test]
    fn detect_host_never_panics() {
        let host = detect_host();
        assert_eq!(host.os, OsFamily::current());
    }
}
