use crate::provider::{check, origin_of};
use crate::{
    Conclusion, Credentials, Event, Provider, ProviderError, ProviderKind, Result, RunStatus,
    StatusOpts,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

pub struct GitLab {
    client: reqwest::Client,
    credentials: Credentials,
    application_name: String,
}

/// Commit status state and the verb used in the merge request note.
fn state_and_title(opts: &StatusOpts) -> (&'static str, &'static str) {
    match (opts.status, opts.conclusion) {
        (RunStatus::InProgress, _) | (_, Conclusion::Pending) => ("running", "started"),
        (_, Conclusion::Skipped) => ("canceled", "skipped validating this commit"),
        (_, Conclusion::Neutral) => ("canceled", "stopped"),
        (_, Conclusion::Failure) => ("failed", "failed"),
        (_, Conclusion::Success) => ("success", "successfully validated your commit"),
    }
}

fn note_body(application_name: &str, opts: &StatusOpts, title: &str) -> String {
    let mut body = format!(
        "**{}** has {}\n\n{}",
        opts.display_name(application_name),
        title,
        opts.text
    );
    if let Some(url) = &opts.details_url {
        body.push_str(&format!(
            "\n\n<small>Full log available [here]({})</small>",
            url
        ));
    }
    body
}

impl GitLab {
    pub fn new(client: reqwest::Client, credentials: Credentials, application_name: String) -> Self {
        Self {
            client,
            credentials,
            application_name,
        }
    }

    fn api_url(&self, event: &Event) -> Result<String> {
        let base = self
            .credentials
            .api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| origin_of(&event.url))
            .ok_or(ProviderError::IncompleteEvent("repository URL"))?;
        Ok(format!("{}/api/v4", base))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("PRIVATE-TOKEN", &self.credentials.token)
    }
}

#[async_trait]
impl Provider for GitLab {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let api = self.api_url(event)?;
        let source = event
            .source_project_id
            .ok_or(ProviderError::IncompleteEvent("source project id"))?;
        let (state, title) = state_and_title(opts);

        let mut body = json!({
            "state": state,
            "name": self.application_name,
            "description": title,
        });
        if let Some(url) = &opts.details_url {
            body["target_url"] = json!(url);
        }
        let url = format!("{}/projects/{}/statuses/{}", api, source, event.sha);
        // GitLab rejects a status identical to the current one.
        match self.post(url).json(&body).send().await {
            Ok(response) => {
                if let Err(e) = check("gitlab", response).await {
                    warn!("GitLab did not accept commit status for {}: {}", event.sha, e);
                }
            }
            Err(e) => warn!("Failed to post commit status for {}: {}", event.sha, e),
        }

        if state == "running" {
            return Ok(());
        }
        let (Some(target), Some(number)) = (event.target_project_id, event.pull_request_number)
        else {
            return Ok(());
        };
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            api, target, number
        );
        let note = note_body(&self.application_name, opts, title);
        check(
            "gitlab",
            self.post(url).json(&json!({ "body": note })).send().await?,
        )
        .await?;
        Ok(())
    }
}
