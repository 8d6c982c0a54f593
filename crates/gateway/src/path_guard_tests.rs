// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
fn rejects_forbidden_prefixes() {
    assert!(PathGuard::validate("/etc/passwd").is_none());
    assert!(PathGuard::validate("/sys/kernel").is_none());
    assert!(PathGuard::validate("/proc/1/mem").is_none());
}

#[test]
fn rejects_traversal() {
    assert!(PathGuard::validate("/tmp/../etc/passwd").is_none());
    assert!(PathGuard::validate("../../../etc/shadow").is_none());
}

#[test]
fn accepts_normal_paths() {
    let result = PathGuard::validate("/tmp/ok.txt");
    assert_eq!(result, Some(PathBuf::from("/tmp/ok.txt")));
}

#[test]
fn collapses_current_dir_components() {
    let result = PathGuard::validate("/tmp/./sub/./file.txt");
    assert_eq!(result, Some(PathBuf::from("/tmp/sub/file.txt")));
}

#[test]
#[serial]
fn rejects_home_ssh_config_prefixes() {
    std::env::set_var("HOME", "/home/tester");
    assert!(PathGuard::validate("/home/tester/.ssh/id_rsa").is_none());
    assert!(PathGuard::validate("/home/tester/.aws/credentials").is_none());
    assert!(PathGuard::validate("/home/tester/.config/app.toml").is_none());
    assert!(PathGuard::validate("/home/tester/projects/app.toml").is_some());
}
