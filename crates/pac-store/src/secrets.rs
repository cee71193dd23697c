use ::entity::{prelude::*, secrets};
use chrono::Utc;
use sea_orm::*;
use std::collections::BTreeMap;

use crate::Result;

pub struct SecretRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SecretRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        let model = Secrets::find_by_id((namespace.to_string(), name.to_string()))
            .one(self.db)
            .await?;
        match model {
            Some(model) => Ok(Some(serde_json::from_value(model.data)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        let data = serde_json::to_value(data)?;
        let existing = Secrets::find_by_id((namespace.to_string(), name.to_string()))
            .one(self.db)
            .await?;

        match existing {
            Some(model) => {
                let mut active: secrets::ActiveModel = model.into();
                active.data = Set(data);
                active.update(self.db).await?;
            }
            None => {
                secrets::ActiveModel {
                    namespace: Set(namespace.to_string()),
                    name: Set(name.to_string()),
                    data: Set(data),
                    created_at: Set(Utc::now().naive_utc()),
                }
                .insert(self.db)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let result = Secrets::delete_by_id((namespace.to_string(), name.to_string()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
