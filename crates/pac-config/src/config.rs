use crate::constants;
use serde::Deserialize;
use std::path::Path;

/// Controller settings, read from the same keys as the PAC config map.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Clamp applied to a run's `max-keep-runs` annotation. 0 disables the clamp.
    #[serde(default)]
    pub max_keep_run_upper_limit: usize,

    /// Retention used when a run carries no `max-keep-runs` annotation. 0 disables it.
    #[serde(default)]
    pub default_max_keep_runs: usize,

    #[serde(default = "default_true")]
    pub error_log_snippet: bool,

    #[serde(default)]
    pub tekton_dashboard_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            max_keep_run_upper_limit: 0,
            default_max_keep_runs: 0,
            error_log_snippet: true,
            tekton_dashboard_url: None,
        }
    }
}

impl Settings {
    /// Resolves how many sibling runs cleanup keeps, if any.
    pub fn effective_max_keep_runs(&self, annotated: Option<usize>) -> Option<usize> {
        match annotated {
            Some(n) if self.max_keep_run_upper_limit > 0 && n > self.max_keep_run_upper_limit => {
                Some(self.max_keep_run_upper_limit)
            }
            Some(n) => Some(n),
            None if self.default_max_keep_runs > 0 => Some(self.default_max_keep_runs),
            None => None,
        }
    }

    pub fn detail_url(&self, namespace: &str, name: &str) -> Option<String> {
        self.tekton_dashboard_url.as_ref().map(|base| {
            format!(
                "{}/#/namespaces/{}/pipelineruns/{}",
                base.trim_end_matches('/'),
                namespace,
                name
            )
        })
    }
}

/// Identity of the controller that owns a run.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub name: String,
    pub configmap: String,
    pub secret: String,
    #[serde(rename = "gRepo")]
    pub global_repository: String,
}

impl Default for ControllerInfo {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_CONTROLLER_LABEL.to_string(),
            configmap: constants::DEFAULT_CONTROLLER_CONFIGMAP.to_string(),
            secret: constants::DEFAULT_CONTROLLER_SECRET.to_string(),
            global_repository: constants::DEFAULT_GLOBAL_REPOSITORY.to_string(),
        }
    }
}

impl ControllerInfo {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: std::env::var("PAC_CONTROLLER_LABEL").unwrap_or(defaults.name),
            configmap: std::env::var("PAC_CONTROLLER_CONFIGMAP").unwrap_or(defaults.configmap),
            secret: std::env::var("PAC_CONTROLLER_SECRET").unwrap_or(defaults.secret),
            global_repository: std::env::var("PAC_CONTROLLER_GLOBAL_REPOSITORY")
                .unwrap_or(defaults.global_repository),
        }
    }

    /// Parses the JSON carried by the `controller-info` annotation.
    pub fn from_annotation(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }
}

fn default_application_name() -> String {
    constants::DEFAULT_APPLICATION_NAME.to_string()
}

fn default_true() -> bool {
    true
}

pub async fn load_settings(path: &Path) -> std::io::Result<Settings> {
    if !path.exists() {
        tracing::info!("No settings file at {:?}, using defaults", path);
        return Ok(Settings::default());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let settings: Settings = toml::from_str(&content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(settings)
}
