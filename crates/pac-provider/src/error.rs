use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to detect git provider for pipelinerun {0} : git-provider label not found")]
    MissingProviderLabel(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no credentials for {0}")]
    MissingCredentials(String),

    #[error("event is missing {0}")]
    IncompleteEvent(&'static str),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("{provider} API returned {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, ProviderError>;
