use crate::provider::check;
use crate::{
    Conclusion, Credentials, Event, Provider, ProviderKind, Result, RunStatus, StatusOpts,
};
use async_trait::async_trait;
use chrono::Utc;
use pac_config::constants;
use serde_json::{Value, json};
use tracing::debug;

/// GitHub and GitHub Enterprise. Runs dispatched through the GitHub App
/// carry an installation id and report through check runs, the rest
/// through commit statuses.
pub struct GitHub {
    client: reqwest::Client,
    kind: ProviderKind,
    credentials: Credentials,
    application_name: String,
}

/// Title and summary shown on the check run.
fn presentation(conclusion: Conclusion, status: RunStatus) -> (&'static str, &'static str) {
    if status == RunStatus::InProgress {
        return ("CI has Started", "is running.");
    }
    match conclusion {
        Conclusion::Success => ("Success", "has <b>successfully</b> validated your commit."),
        Conclusion::Failure => ("Failed", "has <b>failed</b>."),
        Conclusion::Skipped => ("Skipped", "is skipping this commit."),
        Conclusion::Neutral => ("Unknown", "doesn't know what happened with this commit."),
        Conclusion::Pending => ("CI has Started", "is running."),
    }
}

/// State accepted by the commit status API.
fn commit_state(conclusion: Conclusion, status: RunStatus) -> &'static str {
    if status == RunStatus::InProgress {
        return "pending";
    }
    match conclusion {
        Conclusion::Success | Conclusion::Skipped | Conclusion::Neutral => "success",
        Conclusion::Failure => "failure",
        Conclusion::Pending => "pending",
    }
}

fn check_run_body(application_name: &str, opts: &StatusOpts) -> Value {
    let (title, summary) = presentation(opts.conclusion, opts.status);
    let title = if opts.title.is_empty() { title } else { opts.title.as_str() };
    let mut body = json!({
        "name": opts.context_name(application_name),
        "status": opts.status.as_str(),
        "external_id": opts.pipeline_run_name,
        "output": {
            "title": title,
            "summary": format!("{} {}", opts.display_name(application_name), summary),
            "text": opts.text,
        },
    });
    if let Some(url) = &opts.details_url {
        body["details_url"] = json!(url);
    }
    if opts.is_completed() && opts.conclusion != Conclusion::Pending {
        body["conclusion"] = json!(opts.conclusion.as_str());
        body["completed_at"] = json!(Utc::now().to_rfc3339());
    }
    body
}

impl GitHub {
    pub fn new(
        client: reqwest::Client,
        kind: ProviderKind,
        credentials: Credentials,
        application_name: String,
    ) -> Self {
        Self {
            client,
            kind,
            credentials,
            application_name,
        }
    }

    fn api_url(&self, event: &Event) -> String {
        if let Some(url) = &self.credentials.api_url {
            return url.trim_end_matches('/').to_string();
        }
        match &event.ghe_url {
            Some(ghe) => format!("{}/api/v3", ghe.trim_end_matches('/')),
            None => constants::GITHUB_API_URL.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.credentials.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn check_run(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let base = format!(
            "{}/repos/{}/{}/check-runs",
            self.api_url(event),
            event.organization,
            event.repository
        );
        let mut body = check_run_body(&self.application_name, opts);
        let request = match opts.check_run_id {
            Some(id) => self.request(reqwest::Method::PATCH, format!("{}/{}", base, id)),
            None => {
                body["head_sha"] = json!(event.sha);
                self.request(reqwest::Method::POST, base)
            }
        };
        check("github", request.json(&body).send().await?).await?;
        Ok(())
    }

    async fn commit_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let (title, summary) = presentation(opts.conclusion, opts.status);
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url(event),
            event.organization,
            event.repository,
            event.sha
        );
        let mut body = json!({
            "state": commit_state(opts.conclusion, opts.status),
            "description": title,
            "context": opts.context_name(&self.application_name),
        });
        if let Some(target) = &opts.details_url {
            body["target_url"] = json!(target);
        }
        check(
            "github",
            self.request(reqwest::Method::POST, url).json(&body).send().await?,
        )
        .await?;

        let comment_on = event
            .pull_request_number
            .filter(|_| opts.is_completed() && !opts.text.is_empty() && event.is_pull_request());
        if let Some(number) = comment_on {
            let url = format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_url(event),
                event.organization,
                event.repository,
                number
            );
            let comment = format!(
                "{} {}<br>{}",
                opts.display_name(&self.application_name),
                summary,
                opts.text
            );
            check(
                "github",
                self.request(reqwest::Method::POST, url)
                    .json(&json!({ "body": comment }))
                    .send()
                    .await?,
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for GitHub {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        debug!(
            "Posting {} status for {}/{}@{}",
            opts.conclusion, event.organization, event.repository, event.sha
        );
        if event.installation_id.is_some() {
            self.check_run(event, opts).await
        } else {
            self.commit_status(event, opts).await
        }
    }
}
