use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveTime};
use tablebell_core::availability::{Availability, AvailabilityEngine, BookingRequest, Reservation};
use tablebell_core::config::AvailabilityConfig;
use tablebell_core::demo;
use tablebell_core::domain::restaurant::Restaurant;
use tablebell_core::domain::table::{DiningTable, TableId};
use tablebell_core::ports::CustomerStore;
use tablebell_db::{
    connect_with_settings, migrations, DbPool, SqlCatalog, SqlCustomerStore, SqlReservationStore,
};

struct Harness {
    _dir: tempfile::TempDir,
    pool: DbPool,
    restaurant: Restaurant,
}

/// File-backed database so the pool really hands out several connections.
async fn harness(tables: Vec<DiningTable>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("contract.db").display());
    let pool = connect_with_settings(&url, 8, 10).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");

    let restaurant = demo::restaurant();
    SqlCatalog::new(pool.clone())
        .save(&restaurant, &demo::menu(), &tables)
        .await
        .expect("seed catalog");

    Harness { _dir: dir, pool, restaurant }
}

fn single_table() -> Vec<DiningTable> {
    demo::tables().into_iter().filter(|table| table.id == TableId(1)).collect()
}

fn engine(pool: &DbPool) -> AvailabilityEngine {
    AvailabilityEngine::new(
        Arc::new(SqlCatalog::new(pool.clone())),
        Arc::new(SqlReservationStore::new(pool.clone())),
        AvailabilityConfig::default(),
        StdDuration::from_secs(5),
    )
}

fn request(hour: u32, minute: u32) -> BookingRequest {
    BookingRequest {
        date: NaiveDate::from_ymd_opt(2026, 10, 17).expect("date"),
        time: NaiveTime::from_hms_opt(hour, minute, 0).expect("time"),
        party_size: 2,
        duration: Duration::minutes(90),
    }
}

#[tokio::test]
async fn concurrent_overlapping_bookings_for_one_table_commit_exactly_once() {
    let harness = harness(single_table()).await;
    let customers = SqlCustomerStore::new(harness.pool.clone());

    let mut handles = Vec::new();
    for caller in 0..8u32 {
        let engine = engine(&harness.pool);
        let restaurant = harness.restaurant.clone();
        let customer = customers
            .upsert_by_phone(&format!("+1555010{caller}"), "Caller")
            .await
            .expect("customer");
        handles.push(tokio::spawn(async move {
            let minute = (caller % 4) * 10;
            engine
                .reserve(&restaurant, &request(19, minute), &customer.id, &format!("key-{caller}"))
                .await
        }));
    }

    let mut booked = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("join").expect("reserve") {
            Reservation::Booked(_) => booked += 1,
            Reservation::Unavailable(Availability::NoCapacity { .. }) => refused += 1,
            other => panic!("unexpected reservation outcome: {other:?}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(refused, 7);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM booking")
        .fetch_one(&harness.pool)
        .await
        .expect("count");
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn losing_caller_is_offered_a_time_that_is_actually_free() {
    let harness = harness(single_table()).await;
    let engine = engine(&harness.pool);
    let customer = SqlCustomerStore::new(harness.pool.clone())
        .upsert_by_phone("+15550100", "Priya")
        .await
        .expect("customer");

    let first =
        engine.reserve(&harness.restaurant, &request(19, 0), &customer.id, "first").await;
    assert!(matches!(first, Ok(Reservation::Booked(_))));

    let alternatives =
        match engine.reserve(&harness.restaurant, &request(19, 30), &customer.id, "second").await {
            Ok(Reservation::Unavailable(Availability::NoCapacity { alternatives })) => {
                alternatives
            }
            other => panic!("expected no capacity, got {other:?}"),
        };
    assert!(!alternatives.is_empty());

    let retry = BookingRequest { time: alternatives[0], ..request(19, 30) };
    let booked = engine.reserve(&harness.restaurant, &retry, &customer.id, "retry").await;
    assert!(matches!(booked, Ok(Reservation::Booked(_))));
}

#[tokio::test]
async fn replayed_reservation_returns_the_original_booking() {
    let harness = harness(demo::tables()).await;
    let engine = engine(&harness.pool);
    let customer = SqlCustomerStore::new(harness.pool.clone())
        .upsert_by_phone("+15550100", "Priya")
        .await
        .expect("customer");

    let original = match engine
        .reserve(&harness.restaurant, &request(12, 0), &customer.id, "same-key")
        .await
        .expect("reserve")
    {
        Reservation::Booked(booking) => booking,
        other => panic!("expected booking, got {other:?}"),
    };

    match engine
        .reserve(&harness.restaurant, &request(12, 0), &customer.id, "same-key")
        .await
        .expect("replay")
    {
        Reservation::Existing(existing) => assert_eq!(existing.id, original.id),
        other => panic!("expected existing booking, got {other:?}"),
    }
}
