#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;

fn oxdavmount() -> Command {
    let mut cmd = Command::cargo_bin("oxdavmount").unwrap();
    cmd.env_remove("OXDAVMOUNT_GVFS_SCHEME");
    cmd.env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Basic CLI tests
// ============================================================================

#[test]
fn test_help() {
    oxdavmount()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mount WebDAV shares"))
        .stdout(predicate::str::contains("strategies"))
        .stdout(predicate::str::contains("mount"));
}

#[test]
fn test_version() {
    oxdavmount()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("oxdavmount"));
}

#[test]
fn test_mount_requires_uri() {
    oxdavmount()
        .arg("mount")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_mount_rejects_malformed_uri() {
    oxdavmount()
        .args(["mount", "not a uri"])
        .assert()
        .failure();
}

// ============================================================================
// Strategies command tests
// ============================================================================

#[test]
fn test_strategies_json_lists_builtins() {
    let output = oxdavmount()
        .args(["strategies", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = json["strategies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["gvfs", "applescript"]);
    assert!(json["host"]["os"].is_string());
}

#[test]
fn test_strategies_table() {
    oxdavmount()
        .arg("strategies")
        .assert()
        .success()
        .stdout(predicate::str::contains("gvfs"))
        .stdout(predicate::str::contains("applescript"))
        .stderr(predicate::str::contains("Host:"));
}

// ============================================================================
// Mount command errors
// ============================================================================

#[test]
fn test_unknown_param_fails() {
    oxdavmount()
        .args(["mount", "http://localhost:42427/vault/", "--param", "read-only=true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown mount parameter"));
}

#[test]
fn test_unknown_strategy_fails() {
    oxdavmount()
        .args(["mount", "http://localhost:42427/vault/", "--strategy", "smb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown mount strategy"));
}

#[test]
fn test_quiet_suppresses_error_message() {
    oxdavmount()
        .args(["-q", "mount", "http://localhost:42427/vault/", "--strategy", "smb"])
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}

// ============================================================================
// Mount lifecycle against a fake `gio` on PATH (Linux)
// ============================================================================

#[cfg(target_os = "linux")]
mod gvfs {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::io::{BufRead, BufReader};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::process::{Command as StdCommand, Stdio};

    use assert_cmd::cargo::CommandCargoExt;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use serial_test::file_serial;
    use tempfile::TempDir;

    /// Install a fake `gio` into `dir` that logs its arguments to `gio.log`.
    fn install_fake_gio(dir: &Path, body: &str) {
        let gio = dir.join("gio");
        let log = dir.join("gio.log");
        fs::write(
            &gio,
            format!("#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\n{body}\n", log.display()),
        )
        .unwrap();
        fs::set_permissions(&gio, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn gio_calls(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("gio.log"))
            .map(|log| log.lines().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    fn path_with(dir: &Path) -> OsString {
        let mut paths = vec![dir.to_path_buf()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).unwrap()
    }

    #[test]
    #[file_serial]
    fn test_mount_failure_exits_with_one() {
        let temp = TempDir::new().unwrap();
        install_fake_gio(
            temp.path(),
            "echo 'gio: Operation not supported' >&2\nexit 2",
        );

        oxdavmount()
            .env("PATH", path_with(temp.path()))
            .env("XDG_CURRENT_DESKTOP", "GNOME")
            .args(["mount", "http://localhost:42427/vault/", "--strategy", "gvfs"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Failed to mount"))
            .stderr(predicate::str::contains("Operation not supported"));
    }

    #[test]
    #[file_serial]
    fn test_mount_reveal_then_unmount_on_sigterm() {
        let temp = TempDir::new().unwrap();
        install_fake_gio(temp.path(), "exit 0");

        let mut child = StdCommand::cargo_bin("oxdavmount")
            .unwrap()
            .env("PATH", path_with(temp.path()))
            .env("XDG_CURRENT_DESKTOP", "GNOME")
            .env_remove("OXDAVMOUNT_GVFS_SCHEME")
            .args([
                "mount",
                "http://localhost:42427/vault/",
                "--strategy",
                "gvfs",
                "--scheme",
                "davs",
                "--reveal",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        // The locator is printed once the mount is established
        let mut line = String::new();
        BufReader::new(child.stdout.take().unwrap())
            .read_line(&mut line)
            .unwrap();
        assert_eq!(line.trim(), "davs://localhost:42427/vault/");

        let pid = Pid::from_raw(i32::try_from(child.id()).unwrap());
        kill(pid, Signal::SIGTERM).unwrap();
        let status = child.wait().unwrap();
        assert!(status.success(), "{status:?}");

        assert_eq!(
            gio_calls(temp.path()),
            [
                "mount davs://localhost:42427/vault/",
                "open davs://localhost:42427/vault/",
                "mount -u davs://localhost:42427/vault/",
            ]
        );
    }
}
