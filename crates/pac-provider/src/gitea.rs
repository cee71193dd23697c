use crate::provider::{check, origin_of};
use crate::{
    Conclusion, Credentials, Event, Provider, ProviderError, ProviderKind, Result, RunStatus,
    StatusOpts,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Gitea and Forgejo commit statuses.
pub struct Gitea {
    client: reqwest::Client,
    credentials: Credentials,
    application_name: String,
}

fn status_body(application_name: &str, opts: &StatusOpts) -> Value {
    let (state, title) = match (opts.status, opts.conclusion) {
        (RunStatus::InProgress, _) => ("pending", "CI has Started"),
        (_, Conclusion::Success) => ("success", "Success"),
        (_, Conclusion::Failure) => ("failure", "Failed"),
        (_, Conclusion::Skipped) => ("success", "Skipped"),
        (_, Conclusion::Neutral) => ("success", "Unknown"),
        (_, Conclusion::Pending) => ("pending", "Pending"),
    };
    let mut body = json!({
        "state": state,
        "description": title,
        "context": opts.context_name(application_name),
    });
    if let Some(url) = &opts.details_url {
        body["target_url"] = json!(url);
    }
    body
}

impl Gitea {
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
impl Provider for Gitea {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitea
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let url = format!(
            "{}/api/v1/repos/{}/{}/statuses/{}",
            self.api_url(event)?,
            event.organization,
            event.repository,
            event.sha
        );
        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.credentials.token),
            )
            .json(&status_body(&self.application_name, opts))
            .send()
            .await?;
        check("gitea", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body() {
        let mut opts = StatusOpts::new(RunStatus::Completed, Conclusion::Neutral);
        opts.original_pipeline_run_name = "push".to_string();
        let body = status_body("PAC", &opts);
        assert_eq!(body["state"], "success");
        assert_eq!(body["description"], "Unknown");
        assert_eq!(body["context"], "PAC / push");
        assert!(body.get("target_url").is_none());

        let mut opts = StatusOpts::new(RunStatus::InProgress, Conclusion::Pending);
        opts.details_url = Some("https://dash/run".to_string());
        let body = status_body("PAC", &opts);
        assert_eq!(body["state"], "pending");
        assert_eq!(body["target_url"], "https://dash/run");
    }

    #[test]
    fn test_api_url_falls_back_to_event_origin() {
        let gitea = Gitea::new(reqwest::Client::new(), Credentials::default(), "PAC".into());
        let event = Event {
            url: "https://gitea.example.com/org/repo".to_string(),
            ..Default::default()
        };
        assert_eq!(gitea.api_url(&event).unwrap(), "https://gitea.example.com");
        assert!(gitea.api_url(&Event::default()).is_err());
    }
}
