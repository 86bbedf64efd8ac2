use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use tablebell_core::domain::customer::{Customer, CustomerId};
use tablebell_core::ports::{CustomerStore, StoreError};

use super::{decode_err, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerStore {
    pool: DbPool,
}

impl SqlCustomerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, phone, name FROM customer WHERE phone = ?")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn upsert(&self, phone: &str, name: &str) -> Result<Customer, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "INSERT INTO customer (id, phone, name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
             RETURNING id, phone, name",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(phone)
        .bind(name)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        row_to_customer(&row)
    }
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let id = Uuid::parse_str(&id).map_err(|e| RepositoryError::Decode(format!("id: {e}")))?;

    Ok(Customer {
        id: CustomerId(id),
        phone: row.try_get("phone").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
    })
}

#[async_trait]
impl CustomerStore for SqlCustomerStore {
    async fn upsert_by_phone(&self, phone: &str, name: &str) -> Result<Customer, StoreError> {
        Ok(self.upsert(phone, name).await?)
    }
}
