use chrono::{DateTime, Utc};
use pac_config::keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Splits a `<namespace>/<name>` key.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Some((namespace, name))
        }
        _ => None,
    }
}

/// Lifecycle state PAC records in the `state` label and annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Queued,
    Started,
    Completed,
    Failed,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Queued => keys::STATE_QUEUED,
            State::Started => keys::STATE_STARTED,
            State::Completed => keys::STATE_COMPLETED,
            State::Failed => keys::STATE_FAILED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            keys::STATE_QUEUED => Ok(State::Queued),
            keys::STATE_STARTED => Ok(State::Started),
            keys::STATE_COMPLETED => Ok(State::Completed),
            keys::STATE_FAILED => Ok(State::Failed),
            _ => Err(format!("Invalid state: {}", s)),
        }
    }
}

/// Value of the workload runtime's `spec.status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecStatus {
    #[serde(rename = "PipelineRunPending")]
    Pending,
    #[serde(rename = "Cancelled")]
    Cancelled,
    #[serde(rename = "CancelledRunFinally")]
    CancelledRunFinally,
    #[serde(rename = "StoppedRunFinally")]
    StoppedRunFinally,
}

impl SpecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecStatus::Pending => "PipelineRunPending",
            SpecStatus::Cancelled => "Cancelled",
            SpecStatus::CancelledRunFinally => "CancelledRunFinally",
            SpecStatus::StoppedRunFinally => "StoppedRunFinally",
        }
    }

    pub fn is_cancellation(&self) -> bool {
        !matches!(self, SpecStatus::Pending)
    }
}

impl FromStr for SpecStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PipelineRunPending" => Ok(SpecStatus::Pending),
            "Cancelled" => Ok(SpecStatus::Cancelled),
            "CancelledRunFinally" => Ok(SpecStatus::CancelledRunFinally),
            "StoppedRunFinally" => Ok(SpecStatus::StoppedRunFinally),
            _ => Err(format!("Invalid spec status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub const SUCCEEDED: &'static str = "Succeeded";

    pub fn succeeded(status: ConditionStatus, reason: impl Into<String>) -> Self {
        Self {
            type_: Self::SUCCEEDED.to_string(),
            status,
            reason: reason.into(),
            message: String::new(),
        }
    }
}

/// Status of one task run spawned by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStatus {
    pub name: String,
    pub pipeline_task_name: String,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl ChildStatus {
    pub fn is_failed(&self) -> bool {
        self.condition
            .as_ref()
            .is_some_and(|c| c.status == ConditionStatus::False)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRunStatus {
    pub conditions: Vec<Condition>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub child_statuses: Vec<ChildStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec_status: Option<SpecStatus>,
    pub status: PipelineRunStatus,
    pub creation_time: DateTime<Utc>,
    pub resource_version: i64,
}

impl PipelineRun {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec_status: None,
            status: PipelineRunStatus::default(),
            creation_time: Utc::now(),
            resource_version: 0,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// State recorded in the `state` annotation. Unknown values read as `None`.
    pub fn state(&self) -> Option<State> {
        self.annotation(keys::STATE).and_then(|s| s.parse().ok())
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.annotation(keys::REPOSITORY)
    }

    /// Keys of the dispatch batch this run belongs to, in dispatch order.
    pub fn execution_order(&self) -> Option<Vec<String>> {
        self.annotation(keys::EXECUTION_ORDER).map(|order| {
            order
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    pub fn max_keep_runs(&self) -> Option<usize> {
        self.annotation(keys::MAX_KEEP_RUNS)
            .and_then(|value| value.trim().parse().ok())
    }

    pub fn succeeded_condition(&self) -> Option<&Condition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.type_ == Condition::SUCCEEDED)
    }

    pub fn condition_reason(&self) -> Option<&str> {
        self.succeeded_condition().map(|c| c.reason.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.spec_status == Some(SpecStatus::Pending)
    }

    pub fn is_done(&self) -> bool {
        self.succeeded_condition()
            .is_some_and(|c| c.status != ConditionStatus::Unknown)
    }

    pub fn is_cancelled(&self) -> bool {
        self.spec_status.is_some_and(|s| s.is_cancellation())
    }

    pub fn is_pac_managed(&self) -> bool {
        self.label(keys::MANAGED_BY) == Some(keys::MANAGED_BY_VALUE)
            && self.annotations.contains_key(keys::REPOSITORY)
    }
}

/// Merge patch applied to a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRunPatch {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// `Some(None)` clears the field, `None` leaves it untouched.
    pub spec_status: Option<Option<SpecStatus>>,
}

impl PipelineRunPatch {
    /// Patch recording `state` in both the label and the annotation.
    pub fn state(state: State) -> Self {
        let mut patch = Self::default();
        patch
            .labels
            .insert(keys::STATE.to_string(), state.as_str().to_string());
        patch
            .annotations
            .insert(keys::STATE.to_string(), state.as_str().to_string());
        patch
    }

    pub fn apply(&self, run: &mut PipelineRun) {
        for (key, value) in &self.labels {
            run.labels.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.annotations {
            run.annotations.insert(key.clone(), value.clone());
        }
        if let Some(spec_status) = self.spec_status {
            run.spec_status = spec_status;
        }
    }
}
