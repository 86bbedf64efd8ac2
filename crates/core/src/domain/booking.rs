use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::restaurant::RestaurantId;
use crate::domain::table::TableId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn generate() -> Self {
        Self(format!("bk-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }

    /// Cancelled bookings release their table; every other status holds it.
    pub fn holds_table(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Half-open `[start, end)` seating interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SeatingInterval {
    pub fn new(date: NaiveDate, start: NaiveTime, duration: Duration) -> Self {
        let start = date.and_time(start);
        Self { start, end: start + duration }
    }

    pub fn overlaps(&self, other: &SeatingInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub customer_id: CustomerId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub party_size: u32,
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn interval(&self) -> SeatingInterval {
        SeatingInterval::new(
            self.date,
            self.start_time,
            Duration::minutes(i64::from(self.duration_minutes)),
        )
    }

    pub fn conflicts_with(&self, table_id: TableId, interval: &SeatingInterval) -> bool {
        self.table_id == table_id && self.status.holds_table() && self.interval().overlaps(interval)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime};

    use super::{BookingStatus, SeatingInterval};

    fn interval(hour: u32, minute: u32, minutes: i64) -> SeatingInterval {
        SeatingInterval::new(
            NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date"),
            NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time"),
            Duration::minutes(minutes),
        )
    }

    #[test]
    fn back_to_back_seatings_do_not_overlap() {
        let first = interval(18, 0, 90);
        let second = interval(19, 30, 90);

        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn partial_overlap_is_detected_in_both_directions() {
        let first = interval(18, 0, 90);
        let second = interval(19, 29, 90);

        assert!(first.overlaps(&second));
        assert!(second.overlaps(&first));
    }

    #[test]
    fn booking_status_round_trips_from_storage_encoding() {
        let cases = [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
            BookingStatus::NoShow,
        ];

        for status in cases {
            let decoded = BookingStatus::parse(status.as_str());
            assert_eq!(decoded, Some(status));
        }
    }

    #[test]
    fn only_cancelled_bookings_release_the_table() {
        assert!(!BookingStatus::Cancelled.holds_table());
        assert!(BookingStatus::NoShow.holds_table());
        assert!(BookingStatus::Pending.holds_table());
    }
}
