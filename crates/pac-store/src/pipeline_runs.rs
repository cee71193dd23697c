use ::entity::{pipeline_runs, prelude::*};
use chrono::Utc;
use pac_cluster::{LabelSelector, PipelineRun, PipelineRunPatch, PipelineRunStatus, SpecStatus};
use pac_config::keys;
use sea_orm::*;

use crate::{Result, StoreError};

const KIND: &str = "PipelineRun";

pub struct PipelineRunRepository<'a> {
    db: &'a DatabaseConnection,
}

fn to_domain(model: pipeline_runs::Model) -> Result<PipelineRun> {
    let spec_status = model
        .spec_status
        .as_deref()
        .map(str::parse::<SpecStatus>)
        .transpose()
        .map_err(StoreError::InvalidValue)?;

    Ok(PipelineRun {
        labels: serde_json::from_value(model.labels)?,
        annotations: serde_json::from_value(model.annotations)?,
        status: serde_json::from_value(model.status)?,
        spec_status,
        creation_time: model.creation_time.and_utc(),
        resource_version: model.resource_version,
        namespace: model.namespace,
        name: model.name,
    })
}

fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

impl<'a> PipelineRunRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, namespace: &str, name: &str) -> Result<Option<PipelineRun>> {
        PipelineRuns::find_by_id((namespace.to_string(), name.to_string()))
            .one(self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    /// Runs matching `selector`, oldest first.
    pub async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<PipelineRun>> {
        let mut query = PipelineRuns::find();
        if let Some(namespace) = namespace {
            query = query.filter(pipeline_runs::Column::Namespace.eq(namespace));
        }
        if let Some(repository) = selector.get(keys::REPOSITORY) {
            query = query.filter(pipeline_runs::Column::Repository.eq(repository));
        }

        let models = query
            .order_by_asc(pipeline_runs::Column::CreationTime)
            .order_by_asc(pipeline_runs::Column::Name)
            .all(self.db)
            .await?;

        let mut runs = Vec::with_capacity(models.len());
        for model in models {
            let run = to_domain(model)?;
            if selector.matches(&run.labels) {
                runs.push(run);
            }
        }
        Ok(runs)
    }

    pub async fn create(&self, run: &PipelineRun) -> Result<PipelineRun> {
        let model = pipeline_runs::ActiveModel {
            namespace: Set(run.namespace.clone()),
            name: Set(run.name.clone()),
            repository: Set(run.label(keys::REPOSITORY).map(str::to_string)),
            labels: Set(serde_json::to_value(&run.labels)?),
            annotations: Set(serde_json::to_value(&run.annotations)?),
            spec_status: Set(run.spec_status.map(|s| s.as_str().to_string())),
            status: Set(serde_json::to_value(&run.status)?),
            creation_time: Set(run.creation_time.naive_utc()),
            resource_version: Set(1),
            updated_at: Set(Utc::now().naive_utc()),
        }
        .insert(self.db)
        .await?;
        to_domain(model)
    }

    /// Applies `patch` under a row lock and bumps the resource version.
    pub async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &PipelineRunPatch,
    ) -> Result<PipelineRun> {
        let txn = self.db.begin().await?;
        let model = PipelineRuns::find_by_id((namespace.to_string(), name.to_string()))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: KIND,
                key: object_key(namespace, name),
            })?;

        let mut run = to_domain(model.clone())?;
        patch.apply(&mut run);

        let mut active: pipeline_runs::ActiveModel = model.into();
        active.repository = Set(run.label(keys::REPOSITORY).map(str::to_string));
        active.labels = Set(serde_json::to_value(&run.labels)?);
        active.annotations = Set(serde_json::to_value(&run.annotations)?);
        active.spec_status = Set(run.spec_status.map(|s| s.as_str().to_string()));
        active.resource_version = Set(run.resource_version + 1);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        to_domain(updated)
    }

    /// Records runtime progress reported by the workload executor.
    pub async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PipelineRunStatus,
    ) -> Result<PipelineRun> {
        let txn = self.db.begin().await?;
        let model = PipelineRuns::find_by_id((namespace.to_string(), name.to_string()))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: KIND,
                key: object_key(namespace, name),
            })?;

        let version = model.resource_version;
        let mut active: pipeline_runs::ActiveModel = model.into();
        active.status = Set(serde_json::to_value(status)?);
        active.resource_version = Set(version + 1);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        to_domain(updated)
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let result = PipelineRuns::delete_by_id((namespace.to_string(), name.to_string()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
