use pac_config::{ControllerInfo, Settings, constants};
use pac_reconciler::ReconcilerConfig;
use std::path::PathBuf;
use std::time::Duration;

fn env_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v == "true" || v == "1")
}

pub fn namespace() -> String {
    std::env::var("PAC_NAMESPACE").unwrap_or_else(|_| constants::DEFAULT_NAMESPACE.into())
}

pub fn settings_path() -> PathBuf {
    std::env::var("PAC_CONFIG_PATH")
        .unwrap_or_else(|_| constants::DEFAULT_CONFIG_PATH.into())
        .into()
}

pub fn create_reconciler_config(settings: Settings) -> ReconcilerConfig {
    let mut config = ReconcilerConfig::new(settings, ControllerInfo::from_env(), namespace());
    if let Ok(dir) = std::env::var("LOGS_DIR") {
        config.logs_dir = PathBuf::from(dir);
    }
    config
}

pub fn max_concurrent_reconciles() -> usize {
    std::env::var("MAX_CONCURRENT_RECONCILES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(constants::DEFAULT_MAX_CONCURRENT_RECONCILES)
}

pub fn informer_interval() -> Duration {
    std::env::var("INFORMER_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(constants::DEFAULT_INFORMER_INTERVAL)
}

pub fn queue_repair_enabled() -> bool {
    env_flag(std::env::var("QUEUE_REPAIR_ENABLED").ok())
}
