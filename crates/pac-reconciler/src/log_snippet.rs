use pac_cluster::PipelineRun;
use pac_config::constants;
use std::path::Path;
use tracing::debug;

/// Last lines of a task's log, if the log exists.
pub async fn task_log_tail(logs_dir: &Path, run: &PipelineRun, task: &str) -> Option<String> {
    let path = logs_dir
        .join(&run.namespace)
        .join(&run.name)
        .join(format!("{}.log", task));
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("No log for task {} at {:?}: {}", task, path, e);
            return None;
        }
    };

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(constants::ERROR_LOG_SNIPPET_LINES);
    Some(lines[start..].join("\n"))
}

/// Markdown table of the run's tasks, with log tails of failed tasks appended
/// when `logs_dir` is given.
pub async fn task_status_text(run: &PipelineRun, logs_dir: Option<&Path>) -> String {
    if run.status.child_statuses.is_empty() {
        return String::new();
    }

    let mut text = String::from("| **Status** | **Task** |\n| --- | --- |\n");
    for child in &run.status.child_statuses {
        let reason = child
            .condition
            .as_ref()
            .map(|c| c.reason.as_str())
            .filter(|r| !r.is_empty())
            .unwrap_or("Pending");
        text.push_str(&format!("| {} | {} |\n", reason, child.pipeline_task_name));
    }

    let Some(logs_dir) = logs_dir else {
        return text;
    };
    for child in run.status.child_statuses.iter().filter(|c| c.is_failed()) {
        if let Some(tail) = task_log_tail(logs_dir, run, &child.pipeline_task_name).await {
            text.push_str(&format!(
                "\n**{}** failed:\n```\n{}\n```\n",
                child.pipeline_task_name, tail
            ));
        }
    }
    text
}
