use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;

use tablebell_core::audit::{AuditAction, AuditCategory, AuditError, AuditEvent, AuditSink};
use tablebell_core::domain::restaurant::RestaurantId;

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only `audit_event` writer.
pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (
                id, restaurant_id, resource_type, resource_id, action, category,
                correlation_id, actor, metadata_json, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.restaurant_id.0)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.action.as_str())
        .bind(event.category.as_str())
        .bind(&event.correlation_id)
        .bind(&event.actor)
        .bind(metadata)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, resource_type, resource_id, action, category,
                    correlation_id, actor, metadata_json, occurred_at
             FROM audit_event
             WHERE resource_type = ? AND resource_id = ?
             ORDER BY occurred_at, id",
        )
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

fn parse_category(value: &str) -> Result<AuditCategory, RepositoryError> {
    match value {
        "dialogue" => Ok(AuditCategory::Dialogue),
        "booking" => Ok(AuditCategory::Booking),
        "order" => Ok(AuditCategory::Order),
        "system" => Ok(AuditCategory::System),
        other => Err(RepositoryError::Decode(format!("category: {other}"))),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let action: String = row.try_get("action").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let metadata: String = row.try_get("metadata_json").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    if action != AuditAction::Create.as_str() {
        return Err(RepositoryError::Decode(format!("action: {action}")));
    }
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)
        .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id").map_err(decode_err)?,
        restaurant_id: RestaurantId(row.try_get("restaurant_id").map_err(decode_err)?),
        resource_type: row.try_get("resource_type").map_err(decode_err)?,
        resource_id: row.try_get("resource_id").map_err(decode_err)?,
        action: AuditAction::Create,
        category: parse_category(&category)?,
        correlation_id: row.try_get("correlation_id").map_err(decode_err)?,
        actor: row.try_get("actor").map_err(decode_err)?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}

#[async_trait]
impl AuditSink for SqlAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.append(&event).await.map_err(|error| AuditError(error.to_string()))
    }
}
