use ::entity::{prelude::*, repositories};
use chrono::Utc;
use pac_cluster::Repository;
use sea_orm::{sea_query::Expr, *};

use crate::{Result, StoreError};

const KIND: &str = "Repository";

pub struct RepoRepository<'a> {
    db: &'a DatabaseConnection,
}

fn to_domain(model: repositories::Model) -> Result<Repository> {
    Ok(Repository {
        spec: serde_json::from_value(model.spec)?,
        status: serde_json::from_value(model.status)?,
        namespace: model.namespace,
        name: model.name,
        resource_version: model.resource_version,
    })
}

impl<'a> RepoRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, namespace: &str, name: &str) -> Result<Option<Repository>> {
        Repositories::find_by_id((namespace.to_string(), name.to_string()))
            .one(self.db)
            .await?
            .map(to_domain)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<Repository>> {
        Repositories::find()
            .order_by_asc(repositories::Column::Namespace)
            .order_by_asc(repositories::Column::Name)
            .all(self.db)
            .await?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    /// Creates the repository or replaces its spec, keeping its status.
    pub async fn upsert(&self, repository: &Repository) -> Result<Repository> {
        let spec = serde_json::to_value(&repository.spec)?;
        let existing = Repositories::find_by_id((
            repository.namespace.clone(),
            repository.name.clone(),
        ))
        .one(self.db)
        .await?;

        let model = match existing {
            Some(model) => {
                let version = model.resource_version;
                let mut active: repositories::ActiveModel = model.into();
                active.url = Set(repository.spec.url.clone());
                active.concurrency_limit = Set(repository.spec.concurrency_limit);
                active.spec = Set(spec);
                active.resource_version = Set(version + 1);
                active.update(self.db).await?
            }
            None => {
                let now = Utc::now().naive_utc();
                repositories::ActiveModel {
                    namespace: Set(repository.namespace.clone()),
                    name: Set(repository.name.clone()),
                    url: Set(repository.spec.url.clone()),
                    concurrency_limit: Set(repository.spec.concurrency_limit),
                    spec: Set(spec),
                    status: Set(serde_json::to_value(&repository.status)?),
                    resource_version: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db)
                .await?
            }
        };
        to_domain(model)
    }

    /// Replaces the status list if `repository` still carries the stored
    /// resource version.
    pub async fn update_status(&self, repository: &Repository) -> Result<Repository> {
        let result = Repositories::update_many()
            .col_expr(
                repositories::Column::Status,
                Expr::value(serde_json::to_value(&repository.status)?),
            )
            .col_expr(
                repositories::Column::ResourceVersion,
                Expr::col(repositories::Column::ResourceVersion).add(1),
            )
            .filter(repositories::Column::Namespace.eq(repository.namespace.as_str()))
            .filter(repositories::Column::Name.eq(repository.name.as_str()))
            .filter(repositories::Column::ResourceVersion.eq(repository.resource_version))
            .exec(self.db)
            .await?;

        let stored = self.find(&repository.namespace, &repository.name).await?;
        match stored {
            Some(stored) if result.rows_affected > 0 => Ok(stored),
            Some(_) => Err(StoreError::Conflict {
                kind: KIND,
                key: repository.key(),
            }),
            None => Err(StoreError::NotFound {
                kind: KIND,
                key: repository.key(),
            }),
        }
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let result = Repositories::delete_by_id((namespace.to_string(), name.to_string()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
