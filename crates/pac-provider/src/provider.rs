use crate::{
    BitbucketCloud, BitbucketServer, Event, GitHub, GitLab, Gitea, ProviderError, ProviderKind,
    Result, StatusOpts,
};
use async_trait::async_trait;
use pac_config::constants;
use std::sync::Arc;

/// A forge that accepts commit statuses.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()>;
}

/// Token and endpoint used to talk to a forge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    /// Username for forges that authenticate with basic auth.
    pub user: Option<String>,
    pub api_url: Option<String>,
}

/// Builds a [`Provider`] for a detected forge kind.
pub trait ProviderFactory: Send + Sync {
    fn build(
        &self,
        kind: ProviderKind,
        credentials: Credentials,
        application_name: &str,
    ) -> Result<Arc<dyn Provider>>;
}

pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::PROVIDER_REQUEST_TIMEOUT)
            .user_agent(concat!("pipelines-as-code/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(
        &self,
        kind: ProviderKind,
        credentials: Credentials,
        application_name: &str,
    ) -> Result<Arc<dyn Provider>> {
        if credentials.token.is_empty() {
            return Err(ProviderError::MissingCredentials(kind.to_string()));
        }
        let client = self.client.clone();
        let name = application_name.to_string();
        Ok(match kind {
            ProviderKind::GitHub | ProviderKind::GitHubEnterprise => {
                Arc::new(GitHub::new(client, kind, credentials, name))
            }
            ProviderKind::Gitea => Arc::new(Gitea::new(client, credentials, name)),
            ProviderKind::GitLab => Arc::new(GitLab::new(client, credentials, name)),
            ProviderKind::BitbucketCloud => Arc::new(BitbucketCloud::new(client, credentials, name)),
            ProviderKind::BitbucketServer => {
                Arc::new(BitbucketServer::new(client, credentials, name))
            }
        })
    }
}

/// Turns a non-2xx response into [`ProviderError::Api`].
pub(crate) async fn check(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        provider,
        status: status.as_u16(),
        body,
    })
}

/// Base URL of the forge the event came from, e.g. `https://gitea.example.com`.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
