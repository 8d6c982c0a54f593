// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn base_config() -> GatewayConfig {
    GatewayConfig {
        host: "0.0.0.0".to_string(),
        port: 7900,
        auth_token: None,
        max_instances_per_user: 10,
        assistant_binary: None,
        user_config_path: None,
        log_format: "json".to_string(),
        log_level: "info".to_string(),
    }
}

#[test]
fn default_config_validates() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn zero_quota_is_rejected() {
    let mut config = base_config();
    config.max_instances_per_user = 0;
    assert!(config.validate().is_err());
}

#[test]
fn unknown_log_format_is_rejected() {
    let mut config = base_config();
    config.log_format = "yaml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn unknown_log_level_is_rejected() {
    let mut config = base_config();
    config.log_level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn explicit_assistant_binary_is_used_without_path_lookup() {
    let mut config = base_config();
    config.assistant_binary = Some("/opt/assistant/bin/claude".to_string());
    assert_eq!(config.detect_assistant_binary().as_deref(), Some("/opt/assistant/bin/claude"));
}
