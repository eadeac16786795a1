//! Fake OS tools for exercising strategies without touching the real system.
//!
//! Each fake is a small `/bin/sh` script. Recording fakes append their
//! arguments (one invocation per line) to `<name>.log` next to the script.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake tool");
    path
}

/// Like [`write_script`], but every invocation's arguments are logged first.
pub fn write_recording_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let log = log_path(dir, name);
    write_script(
        dir,
        name,
        &format!("printf '%s\\n' \"$*\" >> '{}'\n{body}", log.display()),
    )
}

/// Argument lines recorded by a recording fake, empty if it never ran.
pub fn invocations(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(log_path(dir, name))
        .map(|log| log.lines().map(ToString::to_string).collect())
        .unwrap_or_default()
}

fn log_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.log"))
}
