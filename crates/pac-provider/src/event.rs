use crate::{ProviderError, Result};
use pac_cluster::PipelineRun;
use pac_config::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    GitHubEnterprise,
    Gitea,
    GitLab,
    BitbucketCloud,
    BitbucketServer,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitHubEnterprise => "github-enterprise",
            ProviderKind::Gitea => "gitea",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::BitbucketCloud => "bitbucket-cloud",
            ProviderKind::BitbucketServer => "bitbucket-server",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderKind::GitHub),
            "github-enterprise" => Ok(ProviderKind::GitHubEnterprise),
            "gitea" | "forgejo" => Ok(ProviderKind::Gitea),
            "gitlab" => Ok(ProviderKind::GitLab),
            "bitbucket-cloud" => Ok(ProviderKind::BitbucketCloud),
            "bitbucket-server" | "bitbucket-datacenter" => Ok(ProviderKind::BitbucketServer),
            _ => Err(ProviderError::UnknownProvider(s.to_string())),
        }
    }
}

/// The forge event a pipeline run was created for, rebuilt from the labels
/// and annotations stamped on it at dispatch time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub url: String,
    pub organization: String,
    pub repository: String,
    pub event_type: String,
    pub base_branch: String,
    pub sha: String,
    pub sha_title: String,
    pub sha_url: String,
    pub sender: String,
    pub pull_request_number: Option<u64>,
    pub installation_id: Option<i64>,
    pub ghe_url: Option<String>,
    pub source_project_id: Option<i64>,
    pub target_project_id: Option<i64>,
}

impl Event {
    pub fn from_pipeline_run(run: &PipelineRun) -> Self {
        let url = run.annotation(keys::REPO_URL).unwrap_or_default().to_string();
        let (organization, repository) = split_repository_url(&url).unwrap_or_else(|| {
            (
                run.annotation(keys::URL_ORG).unwrap_or_default().to_string(),
                run.annotation(keys::URL_REPOSITORY)
                    .unwrap_or_default()
                    .to_string(),
            )
        });

        let text = |key: &str| {
            run.annotation(key)
                .or_else(|| run.label(key))
                .unwrap_or_default()
                .to_string()
        };

        Self {
            url,
            organization,
            repository,
            event_type: text(keys::EVENT_TYPE),
            base_branch: text(keys::BRANCH),
            sha: text(keys::SHA),
            sha_title: text(keys::SHA_TITLE),
            sha_url: text(keys::SHA_URL),
            sender: text(keys::SENDER),
            pull_request_number: parsed(run, keys::PULL_REQUEST),
            installation_id: parsed(run, keys::INSTALLATION_ID).filter(|id: &i64| *id > 0),
            ghe_url: run
                .annotation(keys::GHE_URL)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            source_project_id: parsed(run, keys::SOURCE_PROJECT_ID),
            target_project_id: parsed(run, keys::TARGET_PROJECT_ID),
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.event_type == "pull_request" && self.pull_request_number.is_some()
    }
}

fn parsed<T: std::str::FromStr>(run: &PipelineRun, key: &str) -> Option<T> {
    run.annotation(key).and_then(|value| value.trim().parse().ok())
}

/// Splits a repository URL into organization and repository. Everything
/// before the last path segment is the organization, so GitLab subgroups
/// stay together.
pub fn split_repository_url(url: &str) -> Option<(String, String)> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();
    let (repository, organization) = segments.split_last()?;
    if organization.is_empty() {
        return None;
    }
    Some((
        organization.join("/"),
        repository.trim_end_matches(".git").to_string(),
    ))
}

/// Reads the forge kind from the `git-provider` label and rebuilds the event.
pub fn detect_provider(run: &PipelineRun) -> Result<(ProviderKind, Event)> {
    let label = run
        .label(keys::GIT_PROVIDER)
        .ok_or_else(|| ProviderError::MissingProviderLabel(run.name.clone()))?;
    let kind = label.parse::<ProviderKind>()?;
    Ok((kind, Event::from_pipeline_run(run)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> PipelineRun {
        let mut run = PipelineRun::new("ns", "pr1");
        for (k, v) in labels {
            run.labels.insert(k.to_string(), v.to_string());
        }
        for (k, v) in annotations {
            run.annotations.insert(k.to_string(), v.to_string());
        }
        run
    }

    #[test]
    fn test_split_repository_url() {
        assert_eq!(
            split_repository_url("https://github.com/owner/repo"),
            Some(("owner".to_string(), "repo".to_string()))
        );
        assert_eq!(
            split_repository_url("https://gitlab.com/group/sub/project.git/"),
            Some(("group/sub".to_string(), "project".to_string()))
        );
        assert_eq!(split_repository_url("https://github.com/owner"), None);
        assert_eq!(split_repository_url("not a url"), None);
    }

    #[test]
    fn test_event_from_pipeline_run() {
        let run = run_with(
            &[
                (keys::EVENT_TYPE, "pull_request"),
                (keys::BRANCH, "main"),
                (keys::SHA, "abc123"),
                (keys::SENDER, "octocat"),
            ],
            &[
                (keys::REPO_URL, "https://github.com/owner/repo"),
                (keys::SHA_TITLE, "Fix things"),
                (keys::SHA_URL, "https://github.com/owner/repo/commit/abc123"),
                (keys::PULL_REQUEST, "42"),
                (keys::INSTALLATION_ID, "1234"),
                (keys::SOURCE_PROJECT_ID, "not-a-number"),
            ],
        );

        let event = Event::from_pipeline_run(&run);
        assert_eq!(event.organization, "owner");
        assert_eq!(event.repository, "repo");
        assert_eq!(event.event_type, "pull_request");
        assert_eq!(event.base_branch, "main");
        assert_eq!(event.sha, "abc123");
        assert_eq!(event.sha_title, "Fix things");
        assert_eq!(event.sender, "octocat");
        assert_eq!(event.pull_request_number, Some(42));
        assert_eq!(event.installation_id, Some(1234));
        assert_eq!(event.source_project_id, None);
        assert_eq!(event.ghe_url, None);
        assert!(event.is_pull_request());
    }

    #[test]
    fn test_event_falls_back_to_url_labels() {
        let run = run_with(
            &[(keys::EVENT_TYPE, "push")],
            &[(keys::URL_ORG, "org"), (keys::URL_REPOSITORY, "repo")],
        );
        let event = Event::from_pipeline_run(&run);
        assert_eq!(event.organization, "org");
        assert_eq!(event.repository, "repo");
        assert!(!event.is_pull_request());
    }

    #[test]
    fn test_detect_provider() {
        let run = run_with(&[(keys::GIT_PROVIDER, "gitlab")], &[]);
        let (kind, _) = detect_provider(&run).unwrap();
        assert_eq!(kind, ProviderKind::GitLab);

        let run = run_with(&[], &[]);
        let err = detect_provider(&run).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to detect git provider for pipelinerun pr1 : git-provider label not found"
        );

        let run = run_with(&[(keys::GIT_PROVIDER, "sourcehut")], &[]);
        assert!(matches!(
            detect_provider(&run),
            Err(ProviderError::UnknownProvider(p)) if p == "sourcehut"
        ));
    }

    #[test]
    fn test_provider_kind_round_trips_through_str() {
        for kind in [
            ProviderKind::GitHub,
            ProviderKind::GitHubEnterprise,
            ProviderKind::Gitea,
            ProviderKind::GitLab,
            ProviderKind::BitbucketCloud,
            ProviderKind::BitbucketServer,
        ] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!(
            "bitbucket-datacenter".parse::<ProviderKind>().unwrap(),
            ProviderKind::BitbucketServer
        );
    }
}
