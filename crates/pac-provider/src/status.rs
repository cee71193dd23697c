use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Neutral,
    Skipped,
    Pending,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Neutral => "neutral",
            Conclusion::Skipped => "skipped",
            Conclusion::Pending => "pending",
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to report for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOpts {
    pub status: RunStatus,
    pub conclusion: Conclusion,
    pub title: String,
    pub text: String,
    pub details_url: Option<String>,
    pub pipeline_run_name: String,
    pub original_pipeline_run_name: String,
    pub check_run_id: Option<i64>,
}

impl StatusOpts {
    pub fn new(status: RunStatus, conclusion: Conclusion) -> Self {
        Self {
            status,
            conclusion,
            title: String::new(),
            text: String::new(),
            details_url: None,
            pipeline_run_name: String::new(),
            original_pipeline_run_name: String::new(),
            check_run_id: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Name the status is posted under, one per original run name so that
    /// several pipelines on a commit do not overwrite each other.
    pub fn context_name(&self, application_name: &str) -> String {
        if self.original_pipeline_run_name.is_empty() {
            application_name.to_string()
        } else {
            format!("{} / {}", application_name, self.original_pipeline_run_name)
        }
    }

    /// Application name with the original run name appended, as used in
    /// comment and summary headers.
    pub fn display_name(&self, application_name: &str) -> String {
        if self.original_pipeline_run_name.is_empty() {
            application_name.to_string()
        } else {
            format!("{}/{}", application_name, self.original_pipeline_run_name)
        }
    }
}
