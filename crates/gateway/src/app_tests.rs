use super::*;
use crate::host_bridge::NullHostBridge;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        auth_token: None,
        max_instances_per_user: 3,
        assistant_binary: Some("/bin/echo".to_string()),
        user_config_path: None,
        log_format: "text".to_string(),
        log_level: "info".to_string(),
    }
}

#[tokio::test]
async fn builds_app_state_and_router() {
    let state = Arc::new(AppState::new(test_config(), Arc::new(NullHostBridge)));
    let _router = build_router(state);
}

#[tokio::test]
async fn config_validate_rejects_zero_quota() {
    let mut config = test_config();
    config.max_instances_per_user = 0;
    assert!(config.validate().is_err());
}
