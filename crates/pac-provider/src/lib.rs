mod bitbucket_cloud;
mod bitbucket_server;
mod error;
mod event;
mod gitea;
mod github;
mod gitlab;
mod provider;
mod status;

pub use bitbucket_cloud::BitbucketCloud;
pub use bitbucket_server::BitbucketServer;
pub use error::{ProviderError, Result};
pub use event::{Event, ProviderKind, detect_provider, split_repository_url};
pub use gitea::Gitea;
pub use github::GitHub;
pub use gitlab::GitLab;
pub use provider::{Credentials, HttpProviderFactory, Provider, ProviderFactory};
pub use status::{Conclusion, RunStatus, StatusOpts};
