// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration: a `clap::Parser` struct with every knob
//! overridable via a `COOP_GW_*` environment variable, split into parsing
//! and a separate post-parse `validate` step.

use std::path::PathBuf;

use clap::Parser;

/// Remote terminal/assistant gateway.
#[derive(Debug, Clone, Parser)]
#[command(name = "coop-gateway", version, about)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "COOP_GW_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7900, env = "COOP_GW_PORT")]
    pub port: u16,

    /// Bearer token required on the WebSocket upgrade query string. If
    /// unset, auth is disabled (development only).
    #[arg(long, env = "COOP_GW_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Per-user cap on concurrently owned assistant instances.
    #[arg(long, default_value_t = crate::isolation::DEFAULT_QUOTA, env = "COOP_GW_MAX_INSTANCES_PER_USER")]
    pub max_instances_per_user: usize,

    /// Path to the assistant binary to spawn for gateway-owned instances. If
    /// unset, detected via `PATH` lookup at startup.
    #[arg(long, env = "COOP_GW_ASSISTANT_BINARY")]
    pub assistant_binary: Option<String>,

    /// Path to `userData/config.json`, consulted by `workspace:get`.
    #[arg(long, env = "COOP_GW_USER_CONFIG")]
    pub user_config_path: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, default_value = "json", env = "COOP_GW_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "COOP_GW_LOG_LEVEL")]
    pub log_level: String,
}

impl GatewayConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_instances_per_user == 0 {
            anyhow::bail!("--max-instances-per-user must be at least 1");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("invalid log level: {other}"),
        }
        Ok(())
    }

    pub fn detect_assistant_binary(&self) -> Option<String> {
        if let Some(path) = &self.assistant_binary {
            return Some(path.clone());
        }
        which_on_path("claude")
    }
}

/// Minimal `PATH` lookup: splits `PATH` on `:`, joins each entry with the
/// binary name, and returns the first hit that exists. The well-known idiom
/// used wherever a crate doesn't want to pull in the `which` crate for one
/// lookup.
fn which_on_path(binary: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(binary)).find(|candidate| candidate.is_file()).map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
