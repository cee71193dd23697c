use crate::provider::{check, origin_of};
use crate::{
    Conclusion, Credentials, Event, Provider, ProviderError, ProviderKind, Result, RunStatus,
    StatusOpts,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Bitbucket Server and Data Center build statuses.
pub struct BitbucketServer {
    client: reqwest::Client,
    credentials: Credentials,
    application_name: String,
}

fn build_status_body(application_name: &str, event: &Event, opts: &StatusOpts) -> Value {
    let (state, description) = match (opts.status, opts.conclusion) {
        (RunStatus::InProgress, _) | (_, Conclusion::Pending) => ("INPROGRESS", "CI has started"),
        (_, Conclusion::Success) => ("SUCCESSFUL", "Commit has been validated"),
        (_, Conclusion::Failure) => ("FAILED", "Failed"),
        (_, Conclusion::Skipped) => ("FAILED", "Skipping this commit"),
        (_, Conclusion::Neutral) => ("FAILED", "CI has stopped"),
    };
    let key = if opts.pipeline_run_name.is_empty() {
        opts.conclusion.as_str().to_string()
    } else {
        opts.pipeline_run_name.clone()
    };
    json!({
        "state": state,
        "name": application_name,
        "key": key,
        "description": description,
        "url": opts.details_url.clone().unwrap_or_else(|| event.url.clone()),
    })
}

impl BitbucketServer {
    pub fn new(client: reqwest::Client, credentials: Credentials, application_name: String) -> Self {
        Self {
            client,
            credentials,
            application_name,
        }
    }

    fn api_url(&self, event: &Event) -> Result<String> {
        self.credentials
            .api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| origin_of(&event.url))
            .ok_or(ProviderError::IncompleteEvent("repository URL"))
    }
}

#[async_trait]
impl Provider for BitbucketServer {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BitbucketServer
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let api = self.api_url(event)?;
        let body = build_status_body(&self.application_name, event, opts);
        let response = self
            .client
            .post(format!("{}/rest/build-status/1.0/commits/{}", api, event.sha))
            .bearer_auth(&self.credentials.token)
            .json(&body)
            .send()
            .await?;
        check("bitbucket-server", response).await?;

        let comment_on = event
            .pull_request_number
            .filter(|_| opts.is_completed() && !opts.text.is_empty() && event.is_pull_request());
        if let Some(number) = comment_on {
            let text = format!(
                "**{}** - {}\n\n{}",
                opts.display_name(&self.application_name),
                body["description"].as_str().unwrap_or_default(),
                opts.text
            );
            let url = format!(
                "{}/rest/api/1.0/projects/{}/repos/{}/pull-requests/{}/comments",
                api, event.organization, event.repository, number
            );
            check(
                "bitbucket-server",
                self.client
                    .post(url)
                    .bearer_auth(&self.credentials.token)
                    .json(&json!({ "text": text }))
                    .send()
                    .await?,
            )
            .await?;
        }
        Ok(())
    }
}
