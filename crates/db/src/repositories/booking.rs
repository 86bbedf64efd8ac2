use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use tablebell_core::domain::booking::{Booking, BookingId, BookingStatus};
use tablebell_core::domain::customer::CustomerId;
use tablebell_core::domain::restaurant::RestaurantId;
use tablebell_core::domain::table::TableId;
use tablebell_core::ports::{ReservationStore, ReserveOutcome, StoreError};

use super::{decode_err, parse_count, parse_date, parse_time, parse_timestamp};
use super::{RepositoryError, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id, restaurant_id, table_id, customer_id, booking_date, \
     start_time, duration_minutes, party_size, status, idempotency_key, created_at";

/// Bookings table with an overlap-safe conditional insert.
pub struct SqlReservationStore {
    pool: DbPool,
}

impl SqlReservationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_overlapping(
        &self,
        restaurant_id: &RestaurantId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM booking
             WHERE restaurant_id = ?
               AND status != 'cancelled'
               AND start_at < ?
               AND end_at > ?
             ORDER BY start_at, table_id"
        ))
        .bind(&restaurant_id.0)
        .bind(window_end.format(DATETIME_FORMAT).to_string())
        .bind(window_start.format(DATETIME_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn load_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM booking WHERE idempotency_key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    /// One statement: SQLite holds its write lock for the whole
    /// `INSERT ... SELECT`, so the overlap probe and the insert cannot
    /// interleave with another writer.
    async fn reserve(&self, booking: Booking) -> Result<ReserveOutcome, RepositoryError> {
        let interval = booking.interval();
        let start_at = interval.start.format(DATETIME_FORMAT).to_string();
        let end_at = interval.end.format(DATETIME_FORMAT).to_string();

        let result = sqlx::query(
            "INSERT INTO booking (
                id, restaurant_id, table_id, customer_id, booking_date, start_time,
                duration_minutes, start_at, end_at, party_size, status,
                idempotency_key, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
            WHERE NOT EXISTS (
                SELECT 1 FROM booking
                WHERE table_id = ?3
                  AND status != 'cancelled'
                  AND start_at < ?9
                  AND end_at > ?8
            )
            ON CONFLICT(idempotency_key) DO NOTHING",
        )
        .bind(&booking.id.0)
        .bind(&booking.restaurant_id.0)
        .bind(booking.table_id.0)
        .bind(booking.customer_id.0.to_string())
        .bind(booking.date.format(DATE_FORMAT).to_string())
        .bind(booking.start_time.format(TIME_FORMAT).to_string())
        .bind(i64::from(booking.duration_minutes))
        .bind(&start_at)
        .bind(&end_at)
        .bind(i64::from(booking.party_size))
        .bind(booking.status.as_str())
        .bind(&booking.idempotency_key)
        .bind(booking.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(
                event_name = "availability.reserve.inserted",
                booking_id = %booking.id.0,
                table_id = booking.table_id.0,
                "booking row inserted"
            );
            return Ok(ReserveOutcome::Reserved(booking));
        }

        if let Some(existing) = self.load_by_idempotency_key(&booking.idempotency_key).await? {
            return Ok(ReserveOutcome::Duplicate(existing));
        }

        info!(
            event_name = "availability.reserve.conflict",
            restaurant_id = %booking.restaurant_id.0,
            table_id = booking.table_id.0,
            start_at = %start_at,
            "table already held for an overlapping seating"
        );
        Ok(ReserveOutcome::TableConflict)
    }
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    let customer_id: String = row.try_get("customer_id").map_err(decode_err)?;
    let date: String = row.try_get("booking_date").map_err(decode_err)?;
    let start_time: String = row.try_get("start_time").map_err(decode_err)?;
    let duration: i64 = row.try_get("duration_minutes").map_err(decode_err)?;
    let party_size: i64 = row.try_get("party_size").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Booking {
        id: BookingId(row.try_get("id").map_err(decode_err)?),
        restaurant_id: RestaurantId(row.try_get("restaurant_id").map_err(decode_err)?),
        table_id: TableId(row.try_get("table_id").map_err(decode_err)?),
        customer_id: CustomerId(
            Uuid::parse_str(&customer_id)
                .map_err(|e| RepositoryError::Decode(format!("customer_id: {e}")))?,
        ),
        date: parse_date("booking_date", &date)?,
        start_time: parse_time("start_time", &start_time)?,
        duration_minutes: parse_count("duration_minutes", duration)?,
        party_size: parse_count("party_size", party_size)?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("status: {status}")))?,
        idempotency_key: row.try_get("idempotency_key").map_err(decode_err)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ReservationStore for SqlReservationStore {
    async fn bookings_overlapping(
        &self,
        restaurant_id: &RestaurantId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.load_overlapping(restaurant_id, window_start, window_end).await?)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.load_by_idempotency_key(key).await?)
    }

    async fn try_reserve(&self, booking: Booking) -> Result<ReserveOutcome, StoreError> {
        Ok(self.reserve(booking).await?)
    }
}
