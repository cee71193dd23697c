use crate::Condition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitProvider {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<SecretRef>,
}

impl GitProvider {
    /// Fills unset fields from `other`. Providers of different types never merge.
    pub fn merge(&mut self, other: &GitProvider) {
        if !other.type_.is_empty() && !self.type_.is_empty() && self.type_ != other.type_ {
            return;
        }
        if self.url.is_empty() {
            self.url = other.url.clone();
        }
        if self.user.is_empty() {
            self.user = other.user.clone();
        }
        if self.type_.is_empty() {
            self.type_ = other.type_.clone();
        }
        if self.secret.is_none() {
            self.secret = other.secret.clone();
        }
        if self.webhook_secret.is_none() {
            self.webhook_secret = other.webhook_secret.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub ok_to_test: Vec<String>,
    #[serde(default)]
    pub pull_request: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelinerun_provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_app_token_scope_repos: Option<Vec<String>>,
}

impl RepositorySettings {
    pub fn merge(&mut self, other: &RepositorySettings) {
        if self.pipelinerun_provenance.is_none() {
            self.pipelinerun_provenance = other.pipelinerun_provenance.clone();
        }
        if self.policy.is_none() {
            self.policy = other.policy.clone();
        }
        if self.github_app_token_scope_repos.is_none() {
            self.github_app_token_scope_repos = other.github_app_token_scope_repos.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incoming {
    #[serde(rename = "type")]
    pub type_: String,
    pub secret: SecretRef,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_provider: Option<GitProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RepositorySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Param>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomings: Option<Vec<Incoming>>,
}

impl RepositorySpec {
    /// Merges settings from the global repository. Local values always win.
    pub fn merge(&mut self, global: &RepositorySpec) {
        if self.concurrency_limit.is_none() {
            self.concurrency_limit = global.concurrency_limit;
        }
        if let (Some(settings), Some(global_settings)) = (&mut self.settings, &global.settings) {
            settings.merge(global_settings);
        }
        if let (Some(provider), Some(global_provider)) =
            (&mut self.git_provider, &global.git_provider)
        {
            provider.merge(global_provider);
        }
        if self.incomings.is_none() {
            self.incomings = global.incomings.clone();
        }
        if self.params.is_none() {
            self.params = global.params.clone();
        }
    }
}

/// One entry of a repository's recent run history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRunStatus {
    pub pipeline_run_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub sha_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub log_url: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub namespace: String,
    pub name: String,
    pub spec: RepositorySpec,
    pub status: Vec<RepositoryRunStatus>,
    pub resource_version: i64,
}

impl Repository {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            spec: RepositorySpec::default(),
            status: Vec::new(),
            resource_version: 0,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Concurrency limit, with 0 standing for unlimited.
    pub fn concurrency_limit(&self) -> i32 {
        self.spec.concurrency_limit.unwrap_or(0)
    }

    pub fn is_throttled(&self) -> bool {
        self.concurrency_limit() > 0
    }

    /// Appends `entry`, replacing an older entry for the same run and keeping at
    /// most `cap` entries with the oldest evicted first.
    pub fn push_run_status(&mut self, entry: RepositoryRunStatus, cap: usize) {
        self.status
            .retain(|s| s.pipeline_run_name != entry.pipeline_run_name);
        self.status.push(entry);
        if self.status.len() > cap {
            let excess = self.status.len() - cap;
            self.status.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RepositoryRunStatus {
        RepositoryRunStatus {
            pipeline_run_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_push_run_status_caps_and_dedupes() {
        let mut repo = Repository::new("ns", "repo");
        for i in 0..7 {
            repo.push_run_status(entry(&format!("run-{}", i)), 5);
        }
        let names: Vec<_> = repo
            .status
            .iter()
            .map(|s| s.pipeline_run_name.as_str())
            .collect();
        assert_eq!(names, vec!["run-2", "run-3", "run-4", "run-5", "run-6"]);

        repo.push_run_status(entry("run-3"), 5);
        let names: Vec<_> = repo
            .status
            .iter()
            .map(|s| s.pipeline_run_name.as_str())
            .collect();
        assert_eq!(names, vec!["run-2", "run-4", "run-5", "run-6", "run-3"]);
    }

    #[test]
    fn test_merge_fills_missing_values_only() {
        let mut local = RepositorySpec {
            url: "https://github.com/org/repo".to_string(),
            settings: Some(RepositorySettings::default()),
            git_provider: Some(GitProvider {
                type_: "github".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let global = RepositorySpec {
            concurrency_limit: Some(2),
            settings: Some(RepositorySettings {
                pipelinerun_provenance: Some("default_branch".to_string()),
                ..Default::default()
            }),
            git_provider: Some(GitProvider {
                type_: "github".to_string(),
                url: "https://ghe.example.com".to_string(),
                secret: Some(SecretRef {
                    name: "global-token".to_string(),
                    key: "provider.token".to_string(),
                }),
                ..Default::default()
            }),
            params: Some(vec![Param {
                name: "foo".to_string(),
                value: Some("bar".to_string()),
                secret_ref: None,
                filter: None,
            }]),
            ..Default::default()
        };

        local.merge(&global);

        assert_eq!(local.concurrency_limit, Some(2));
        assert_eq!(
            local.settings.as_ref().unwrap().pipelinerun_provenance.as_deref(),
            Some("default_branch")
        );
        let provider = local.git_provider.as_ref().unwrap();
        assert_eq!(provider.url, "https://ghe.example.com");
        assert_eq!(provider.secret.as_ref().unwrap().name, "global-token");
        assert_eq!(local.params.as_ref().unwrap().len(), 1);
        assert_eq!(local.url, "https://github.com/org/repo");
    }

    #[test]
    fn test_merge_keeps_local_limit_and_skips_other_provider_types() {
        let mut local = RepositorySpec {
            concurrency_limit: Some(1),
            git_provider: Some(GitProvider {
                type_: "gitlab".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let global = RepositorySpec {
            concurrency_limit: Some(4),
            git_provider: Some(GitProvider {
                type_: "github".to_string(),
                url: "https://api.github.com".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        local.merge(&global);

        assert_eq!(local.concurrency_limit, Some(1));
        assert!(local.git_provider.as_ref().unwrap().url.is_empty());
    }
}
