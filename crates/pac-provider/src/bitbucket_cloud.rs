use crate::provider::check;
use crate::{
    Conclusion, Credentials, Event, Provider, ProviderKind, Result, RunStatus, StatusOpts,
};
use async_trait::async_trait;
use pac_config::constants;
use serde_json::json;

pub struct BitbucketCloud {
    client: reqwest::Client,
    credentials: Credentials,
    application_name: String,
}

fn state_and_description(opts: &StatusOpts) -> (&'static str, &'static str) {
    match (opts.status, opts.conclusion) {
        (RunStatus::InProgress, _) | (_, Conclusion::Pending) => ("INPROGRESS", "⚡ CI has started"),
        (_, Conclusion::Skipped) => ("STOPPED", "➖ Skipping this commit"),
        (_, Conclusion::Neutral) => ("STOPPED", "➖ CI has stopped"),
        (_, Conclusion::Failure) => ("FAILED", "❌ Failed"),
        (_, Conclusion::Success) => ("SUCCESSFUL", "✅ Commit has been validated"),
    }
}

impl BitbucketCloud {
    pub fn new(client: reqwest::Client, credentials: Credentials, application_name: String) -> Self {
        Self {
            client,
            credentials,
            application_name,
        }
    }

    fn api_url(&self) -> &str {
        self.credentials
            .api_url
            .as_deref()
            .unwrap_or(constants::BITBUCKET_CLOUD_API_URL)
            .trim_end_matches('/')
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.client.post(url).basic_auth(
            self.credentials.user.as_deref().unwrap_or_default(),
            Some(&self.credentials.token),
        )
    }
}

#[async_trait]
impl Provider for BitbucketCloud {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BitbucketCloud
    }

    async fn create_status(&self, event: &Event, opts: &StatusOpts) -> Result<()> {
        let (state, description) = state_and_description(opts);
        let repo_path = format!(
            "{}/repositories/{}/{}",
            self.api_url(),
            event.organization,
            event.repository
        );
        let body = json!({
            "key": opts.context_name(&self.application_name),
            "url": opts.details_url.clone().unwrap_or_else(|| event.url.clone()),
            "state": state,
            "description": description,
        });
        check(
            "bitbucket-cloud",
            self.post(format!("{}/commit/{}/statuses/build", repo_path, event.sha))
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        let comment_on = event.pull_request_number.filter(|_| {
            state != "STOPPED"
                && opts.is_completed()
                && !opts.text.is_empty()
                && event.is_pull_request()
        });
        if let Some(number) = comment_on {
            let content = format!(
                "**{}** - {}\n\n{}",
                opts.display_name(&self.application_name),
                description,
                opts.text
            );
            check(
                "bitbucket-cloud",
                self.post(format!("{}/pullrequests/{}/comments", repo_path, number))
                    .json(&json!({ "content": { "raw": content } }))
                    .send()
                    .await?,
            )
            .await?;
        }
        Ok(())
    }
}
