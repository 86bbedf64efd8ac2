use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use tablebell_core::domain::customer::CustomerId;
use tablebell_core::domain::menu::MenuItemId;
use tablebell_core::domain::order::{
    FulfillmentType, Order, OrderId, OrderLine, OrderStatus, PaymentMethod,
};
use tablebell_core::domain::restaurant::RestaurantId;
use tablebell_core::ports::{OrderInsertOutcome, OrderStore, StoreError};

use super::{decode_err, parse_count, parse_datetime, parse_decimal, parse_string_list};
use super::{parse_timestamp, RepositoryError, DATETIME_FORMAT};
use crate::DbPool;

pub struct SqlOrderStore {
    pool: DbPool,
}

impl SqlOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, restaurant_id, customer_id, fulfillment_type, fulfillment_time,
                    delivery_address, payment_method, status, total, commission_rate_pct,
                    commission_amount, idempotency_key, created_at
             FROM food_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn load_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, RepositoryError> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM food_order WHERE idempotency_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match id {
            Some(id) => self.find_by_id(&OrderId(id)).await,
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
        let id: String = row.try_get("id").map_err(decode_err)?;
        let line_rows = sqlx::query(
            "SELECT item_id, name, quantity, unit_price, extras
             FROM food_order_line WHERE order_id = ? ORDER BY line_no",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;
        let lines = line_rows.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()?;

        let customer_id: String = row.try_get("customer_id").map_err(decode_err)?;
        let fulfillment_type: String = row.try_get("fulfillment_type").map_err(decode_err)?;
        let fulfillment_time: String = row.try_get("fulfillment_time").map_err(decode_err)?;
        let payment_method: String = row.try_get("payment_method").map_err(decode_err)?;
        let status: String = row.try_get("status").map_err(decode_err)?;
        let total: String = row.try_get("total").map_err(decode_err)?;
        let rate: String = row.try_get("commission_rate_pct").map_err(decode_err)?;
        let commission: String = row.try_get("commission_amount").map_err(decode_err)?;
        let created_at: String = row.try_get("created_at").map_err(decode_err)?;

        Ok(Order {
            id: OrderId(id),
            restaurant_id: RestaurantId(row.try_get("restaurant_id").map_err(decode_err)?),
            customer_id: CustomerId(
                Uuid::parse_str(&customer_id)
                    .map_err(|e| RepositoryError::Decode(format!("customer_id: {e}")))?,
            ),
            lines,
            fulfillment_type: FulfillmentType::parse(&fulfillment_type).ok_or_else(|| {
                RepositoryError::Decode(format!("fulfillment_type: {fulfillment_type}"))
            })?,
            fulfillment_time: parse_datetime("fulfillment_time", &fulfillment_time)?,
            delivery_address: row.try_get("delivery_address").map_err(decode_err)?,
            payment_method: PaymentMethod::parse(&payment_method).ok_or_else(|| {
                RepositoryError::Decode(format!("payment_method: {payment_method}"))
            })?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| RepositoryError::Decode(format!("status: {status}")))?,
            total: parse_decimal("total", &total)?,
            commission_rate_pct: parse_decimal("commission_rate_pct", &rate)?,
            commission_amount: parse_decimal("commission_amount", &commission)?,
            idempotency_key: row.try_get("idempotency_key").map_err(decode_err)?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }

    /// Header and lines go in one transaction; a unique-key collision on the
    /// idempotency key leaves the earlier order in place.
    async fn insert_order(&self, order: Order) -> Result<OrderInsertOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO food_order (
                id, restaurant_id, customer_id, fulfillment_type, fulfillment_time,
                delivery_address, payment_method, status, total, commission_rate_pct,
                commission_amount, idempotency_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(idempotency_key) DO NOTHING",
        )
        .bind(&order.id.0)
        .bind(&order.restaurant_id.0)
        .bind(order.customer_id.0.to_string())
        .bind(order.fulfillment_type.as_str())
        .bind(order.fulfillment_time.format(DATETIME_FORMAT).to_string())
        .bind(order.delivery_address.as_deref())
        .bind(order.payment_method.as_str())
        .bind(order.status.as_str())
        .bind(order.total.to_string())
        .bind(order.commission_rate_pct.to_string())
        .bind(order.commission_amount.to_string())
        .bind(&order.idempotency_key)
        .bind(order.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.load_by_idempotency_key(&order.idempotency_key).await? {
                Some(existing) => Ok(OrderInsertOutcome::Duplicate(existing)),
                None => Err(RepositoryError::Decode(format!(
                    "order {} was neither inserted nor found by idempotency key",
                    order.id.0
                ))),
            };
        }

        for (line_no, line) in order.lines.iter().enumerate() {
            let extras = serde_json::to_string(&line.extras)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            sqlx::query(
                "INSERT INTO food_order_line (
                    order_id, line_no, item_id, name, quantity, unit_price, extras
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(i64::try_from(line_no).unwrap_or(i64::MAX))
            .bind(&line.item_id.0)
            .bind(&line.name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .bind(extras)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "commit.order.inserted",
            order_id = %order.id.0,
            lines = order.lines.len(),
            "order rows inserted"
        );
        Ok(OrderInsertOutcome::Created(order))
    }
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<OrderLine, RepositoryError> {
    let quantity: i64 = row.try_get("quantity").map_err(decode_err)?;
    let unit_price: String = row.try_get("unit_price").map_err(decode_err)?;
    let extras: String = row.try_get("extras").map_err(decode_err)?;

    Ok(OrderLine {
        item_id: MenuItemId(row.try_get("item_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        quantity: parse_count("quantity", quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        extras: parse_string_list("extras", &extras)?,
    })
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.load_by_idempotency_key(key).await?)
    }

    async fn insert(&self, order: Order) -> Result<OrderInsertOutcome, StoreError> {
        Ok(self.insert_order(order).await?)
    }
}
