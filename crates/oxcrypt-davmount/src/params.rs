//! Caller-supplied mount configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Recognized mount options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountParam {
    /// URI scheme handed to gvfs instead of `http`/`https` (default `dav`;
    /// `davs` for TLS endpoints).
    PreferredGvfsScheme,
}

impl MountParam {
    /// The option's configuration key.
    pub fn key(&self) -> &'static str {
        match self {
            MountParam::PreferredGvfsScheme => "preferred-gvfs-scheme",
        }
    }

    /// All recognized options.
    pub fn all() -> &'static [MountParam] {
        &[MountParam::PreferredGvfsScheme]
    }
}

impl fmt::Display for MountParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MountParam {
    type Err = ParamParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MountParam::all()
            .iter()
            .copied()
            .find(|p| p.key() == s)
            .ok_or_else(|| ParamParseError::UnknownKey(s.to_string()))
    }
}

/// Errors from parsing `key=value` parameter strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamParseError {
    /// No `=` separator
    #[error("Expected KEY=VALUE, got {0:?}")]
    MissingSeparator(String),

    /// Key is not a recognized option
    #[error("Unknown mount parameter {0:?}")]
    UnknownKey(String),
}

/// Mapping of mount options to values. Read-only to strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountParams(BTreeMap<MountParam, String>);

impl MountParams {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `param` to `value`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, param: MountParam, value: impl Into<String>) -> Self {
        self.0.insert(param, value.into());
        self
    }

    /// Value of `param`, if set.
    pub fn get(&self, param: MountParam) -> Option<&str> {
        self.0.get(&param).map(String::as_str)
    }

    /// Value of `param`, or `default` if unset.
    pub fn get_or<'a>(&'a self, param: MountParam, default: &'a str) -> &'a str {
        self.get(param).unwrap_or(default)
    }

    /// Parse a `key=value` pair and set it.
    pub fn set_from_pair(&mut self, pair: &str) -> Result<(), ParamParseError> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ParamParseError::MissingSeparator(pair.to_string()))?;
        self.0.insert(key.trim().parse()?, value.trim().to_string());
        Ok(())
    }

    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(MountParam, String)> for MountParams {
    fn from_iter<I: IntoIterator<Item = (MountParam, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
