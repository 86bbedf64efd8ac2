//! Table assignment and alternative-time search.
//!
//! [`plan_assignment`] is pure and decides everything from a snapshot of
//! tables and bookings. [`AvailabilityEngine`] loads that snapshot through the
//! collaborator ports and turns a plan into a reservation with the store's
//! atomic check-and-reserve, re-planning when another caller got there first.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::{info, warn};

use crate::config::AvailabilityConfig;
use crate::domain::booking::{Booking, BookingId, BookingStatus, SeatingInterval};
use crate::domain::customer::CustomerId;
use crate::domain::restaurant::{OperatingHours, Restaurant};
use crate::domain::table::DiningTable;
use crate::errors::ApplicationError;
use crate::ports::{bounded, CatalogProvider, ReservationStore, ReserveOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party_size: u32,
    pub duration: Duration,
}

impl BookingRequest {
    pub fn interval(&self) -> SeatingInterval {
        SeatingInterval::new(self.date, self.time, self.duration)
    }

    fn at(&self, time: NaiveTime) -> Self {
        Self { time, ..*self }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    Assigned { table: DiningTable, interval: SeatingInterval },
    /// Nothing free at the requested time; `alternatives` each leave at
    /// least one suitable table free. Never booked automatically.
    NoCapacity { alternatives: Vec<NaiveTime> },
    OutsideHours { opening: NaiveTime, latest_start: Option<NaiveTime> },
}

/// Smallest free table that seats the party, lowest id on ties.
pub fn best_free_table<'a>(
    tables: &'a [DiningTable],
    bookings: &[Booking],
    party_size: u32,
    interval: &SeatingInterval,
) -> Option<&'a DiningTable> {
    tables
        .iter()
        .filter(|table| table.seats(party_size))
        .filter(|table| !bookings.iter().any(|booking| booking.conflicts_with(table.id, interval)))
        .min_by_key(|table| (table.capacity, table.id))
}

pub fn plan_assignment(
    tables: &[DiningTable],
    bookings: &[Booking],
    request: &BookingRequest,
    hours: &OperatingHours,
    settings: &AvailabilityConfig,
) -> Availability {
    if !hours.admits_booking(request.time, request.duration) {
        return Availability::OutsideHours {
            opening: hours.opening,
            latest_start: hours.latest_start(request.duration),
        };
    }

    let interval = request.interval();
    match best_free_table(tables, bookings, request.party_size, &interval) {
        Some(table) => Availability::Assigned { table: table.clone(), interval },
        None => Availability::NoCapacity {
            alternatives: alternatives(tables, bookings, request, hours, settings),
        },
    }
}

/// Nearest bookable start times on the step grid around the request, after
/// before before at equal distance, closest first.
pub fn alternatives(
    tables: &[DiningTable],
    bookings: &[Booking],
    request: &BookingRequest,
    hours: &OperatingHours,
    settings: &AvailabilityConfig,
) -> Vec<NaiveTime> {
    let mut found = Vec::new();
    if settings.max_alternatives == 0 {
        return found;
    }
    let Some(latest) = hours.latest_start(request.duration) else {
        return found;
    };
    let in_window = |time: NaiveTime| time >= hours.opening && time <= latest;
    let step = Duration::minutes(i64::from(settings.slot_step_minutes));

    for offset in 1_i32.. {
        let delta = step * offset;
        let (after, after_wrapped) = request.time.overflowing_add_signed(delta);
        let (before, before_wrapped) = request.time.overflowing_sub_signed(delta);
        let after = Some(after).filter(|time| after_wrapped == 0 && in_window(*time));
        let before = Some(before).filter(|time| before_wrapped == 0 && in_window(*time));

        if after.is_none() && before.is_none() {
            break;
        }

        for candidate in [after, before].into_iter().flatten() {
            let probe = request.at(candidate);
            if best_free_table(tables, bookings, probe.party_size, &probe.interval()).is_some() {
                found.push(candidate);
                if found.len() >= settings.max_alternatives {
                    return found;
                }
            }
        }
    }

    found
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reservation {
    Booked(Booking),
    /// The idempotency key was already used; this is the earlier booking.
    Existing(Booking),
    Unavailable(Availability),
}

#[derive(Clone)]
pub struct AvailabilityEngine {
    catalog: Arc<dyn CatalogProvider>,
    reservations: Arc<dyn ReservationStore>,
    settings: AvailabilityConfig,
    timeout: StdDuration,
}

impl AvailabilityEngine {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        reservations: Arc<dyn ReservationStore>,
        settings: AvailabilityConfig,
        timeout: StdDuration,
    ) -> Self {
        Self { catalog, reservations, settings, timeout }
    }

    pub async fn find_table(
        &self,
        restaurant: &Restaurant,
        request: &BookingRequest,
    ) -> Result<Availability, ApplicationError> {
        let hours = restaurant.hours();
        if !hours.admits_booking(request.time, request.duration) {
            return Ok(plan_assignment(&[], &[], request, &hours, &self.settings));
        }

        let tables =
            bounded("catalog", self.timeout, self.catalog.tables(&restaurant.id)).await?;
        let day_start = request.date.and_time(NaiveTime::MIN);
        let bookings = bounded(
            "reservations",
            self.timeout,
            self.reservations.bookings_overlapping(
                &restaurant.id,
                day_start,
                day_start + Duration::days(1),
            ),
        )
        .await?;

        Ok(plan_assignment(&tables, &bookings, request, &hours, &self.settings))
    }

    /// Plans and reserves a table atomically. A lost race re-plans against
    /// fresh data, up to `max_reserve_attempts` times.
    pub async fn reserve(
        &self,
        restaurant: &Restaurant,
        request: &BookingRequest,
        customer_id: &CustomerId,
        idempotency_key: &str,
    ) -> Result<Reservation, ApplicationError> {
        let attempts = self.settings.max_reserve_attempts.max(1);
        for attempt in 1..=attempts {
            let table = match self.find_table(restaurant, request).await? {
                Availability::Assigned { table, .. } => table,
                unavailable => return Ok(Reservation::Unavailable(unavailable)),
            };

            let booking = Booking {
                id: BookingId::generate(),
                restaurant_id: restaurant.id.clone(),
                table_id: table.id,
                customer_id: customer_id.clone(),
                date: request.date,
                start_time: request.time,
                duration_minutes: u32::try_from(request.duration.num_minutes()).unwrap_or(0),
                party_size: request.party_size,
                status: BookingStatus::Confirmed,
                idempotency_key: idempotency_key.to_string(),
                created_at: Utc::now(),
            };

            match bounded("reservations", self.timeout, self.reservations.try_reserve(booking))
                .await?
            {
                ReserveOutcome::Reserved(booking) => {
                    info!(
                        event_name = "availability.reserve.booked",
                        restaurant_id = %restaurant.id.0,
                        table_id = booking.table_id.0,
                        attempt,
                        "table reserved"
                    );
                    return Ok(Reservation::Booked(booking));
                }
                ReserveOutcome::Duplicate(existing) => return Ok(Reservation::Existing(existing)),
                ReserveOutcome::TableConflict => {
                    warn!(
                        event_name = "availability.reserve.conflict",
                        restaurant_id = %restaurant.id.0,
                        table_id = table.id.0,
                        attempt,
                        "table taken by a concurrent booking, re-planning"
                    );
                }
            }
        }

        let alternatives = match self.find_table(restaurant, request).await? {
            Availability::NoCapacity { alternatives } => alternatives,
            _ => Vec::new(),
        };
        Ok(Reservation::Unavailable(Availability::NoCapacity { alternatives }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{
        alternatives, best_free_table, plan_assignment, Availability, AvailabilityEngine,
        BookingRequest, Reservation,
    };
    use crate::config::AvailabilityConfig;
    use crate::demo;
    use crate::domain::booking::{Booking, BookingId, BookingStatus};
    use crate::domain::customer::CustomerId;
    use crate::domain::restaurant::{OperatingHours, RestaurantId};
    use crate::domain::table::{DiningTable, TableId};
    use crate::memory::{InMemoryCatalog, InMemoryReservationStore};

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
    }

    fn hours() -> OperatingHours {
        OperatingHours { opening: hm(11, 0), closing: hm(22, 0) }
    }

    fn table(id: i64, capacity: u32) -> DiningTable {
        DiningTable {
            id: TableId(id),
            restaurant_id: RestaurantId("spice-route".to_string()),
            label: format!("T{id}"),
            capacity,
            is_active: true,
        }
    }

    fn booking(table_id: i64, start: NaiveTime, status: BookingStatus) -> Booking {
        Booking {
            id: BookingId::generate(),
            restaurant_id: RestaurantId("spice-route".to_string()),
            table_id: TableId(table_id),
            customer_id: CustomerId::generate(),
            date: day(),
            start_time: start,
            duration_minutes: 90,
            party_size: 2,
            status,
            idempotency_key: BookingId::generate().0,
            created_at: Utc::now(),
        }
    }

    fn request(time: NaiveTime, party_size: u32) -> BookingRequest {
        BookingRequest { date: day(), time, party_size, duration: Duration::minutes(90) }
    }

    #[test]
    fn picks_smallest_sufficient_table_then_lowest_id() {
        let tables = vec![table(5, 6), table(4, 4), table(3, 4), table(1, 2)];
        let plan = plan_assignment(
            &tables,
            &[],
            &request(hm(19, 0), 3),
            &hours(),
            &AvailabilityConfig::default(),
        );

        assert!(matches!(plan, Availability::Assigned { ref table, .. } if table.id == TableId(3)));
    }

    #[test]
    fn inactive_and_booked_tables_are_skipped() {
        let mut inactive = table(1, 2);
        inactive.is_active = false;
        let tables = vec![inactive, table(2, 2), table(3, 4)];
        let bookings = vec![booking(2, hm(18, 0), BookingStatus::Confirmed)];

        let plan = plan_assignment(
            &tables,
            &bookings,
            &request(hm(19, 0), 2),
            &hours(),
            &AvailabilityConfig::default(),
        );
        assert!(matches!(plan, Availability::Assigned { ref table, .. } if table.id == TableId(3)));
    }

    #[test]
    fn outside_hours_never_assigns() {
        let tables = vec![table(1, 4)];
        let settings = AvailabilityConfig::default();

        for time in [hm(10, 45), hm(20, 45), hm(21, 30)] {
            let plan = plan_assignment(&tables, &[], &request(time, 2), &hours(), &settings);
            assert_eq!(
                plan,
                Availability::OutsideHours { opening: hm(11, 0), latest_start: Some(hm(20, 30)) }
            );
        }

        let edge = plan_assignment(&tables, &[], &request(hm(20, 30), 2), &hours(), &settings);
        assert!(matches!(edge, Availability::Assigned { .. }));
    }

    #[test]
    fn alternatives_walk_outward_after_first_on_ties() {
        let tables = vec![table(1, 4)];
        let bookings = vec![booking(1, hm(19, 0), BookingStatus::Confirmed)];

        let found = alternatives(
            &tables,
            &bookings,
            &request(hm(19, 0), 2),
            &hours(),
            &AvailabilityConfig::default(),
        );

        // 19:00 booking blocks starts in (17:30, 20:30).
        assert_eq!(found, vec![hm(20, 30), hm(17, 30), hm(17, 15)]);
    }

    #[test]
    fn alternatives_are_empty_when_no_table_can_ever_seat_the_party() {
        let tables = vec![table(1, 4)];
        let plan = plan_assignment(
            &tables,
            &[],
            &request(hm(19, 0), 9),
            &hours(),
            &AvailabilityConfig::default(),
        );
        assert_eq!(plan, Availability::NoCapacity { alternatives: Vec::new() });
    }

    #[test]
    fn cancelled_bookings_do_not_block() {
        let tables = vec![table(1, 2)];
        let bookings = vec![booking(1, hm(19, 0), BookingStatus::Cancelled)];
        let interval = request(hm(19, 0), 2).interval();
        assert!(best_free_table(&tables, &bookings, 2, &interval).is_some());
    }

    #[test]
    fn assignment_never_overlaps_existing_bookings() {
        let mut rng = StdRng::seed_from_u64(0x7AB1E);
        let settings = AvailabilityConfig::default();
        let grid = |rng: &mut StdRng| hm(11, 0) + Duration::minutes(15 * rng.gen_range(0..=38));

        for _ in 0..500 {
            let tables = (1..=rng.gen_range(1..=6))
                .map(|id| {
                    let mut table = table(id, rng.gen_range(2..=8));
                    table.is_active = rng.gen_bool(0.9);
                    table
                })
                .collect::<Vec<_>>();
            let bookings = (0..rng.gen_range(0..=14))
                .map(|_| {
                    let status = if rng.gen_bool(0.15) {
                        BookingStatus::Cancelled
                    } else {
                        BookingStatus::Confirmed
                    };
                    booking(rng.gen_range(1..=6), grid(&mut rng), status)
                })
                .collect::<Vec<_>>();
            let request = request(grid(&mut rng), rng.gen_range(1..=8));

            match plan_assignment(&tables, &bookings, &request, &hours(), &settings) {
                Availability::Assigned { table, interval } => {
                    assert!(table.seats(request.party_size));
                    let overlapping =
                        bookings.iter().any(|booking| booking.conflicts_with(table.id, &interval));
                    assert!(!overlapping);
                    let smaller_free = tables.iter().any(|other| {
                        other.seats(request.party_size)
                            && (other.capacity, other.id) < (table.capacity, table.id)
                            && !bookings
                                .iter()
                                .any(|booking| booking.conflicts_with(other.id, &interval))
                    });
                    assert!(!smaller_free, "best fit must be chosen");
                }
                Availability::NoCapacity { alternatives } => {
                    assert!(best_free_table(
                        &tables,
                        &bookings,
                        request.party_size,
                        &request.interval()
                    )
                    .is_none());
                    assert!(alternatives.len() <= settings.max_alternatives);
                    for time in alternatives {
                        let probe = BookingRequest { time, ..request };
                        assert!(hours().admits_booking(time, probe.duration));
                        assert!(best_free_table(
                            &tables,
                            &bookings,
                            probe.party_size,
                            &probe.interval()
                        )
                        .is_some());
                    }
                }
                Availability::OutsideHours { .. } => {
                    panic!("grid requests are always within hours");
                }
            }
        }
    }

    fn one_table_engine() -> (AvailabilityEngine, Arc<InMemoryReservationStore>) {
        let catalog = InMemoryCatalog::default().with_restaurant(
            demo::restaurant(),
            demo::menu(),
            vec![table(1, 4)],
        );
        let reservations = Arc::new(InMemoryReservationStore::default());
        let engine = AvailabilityEngine::new(
            Arc::new(catalog),
            reservations.clone(),
            AvailabilityConfig::default(),
            StdDuration::from_secs(2),
        );
        (engine, reservations)
    }

    #[tokio::test]
    async fn concurrent_reservations_for_one_table_commit_exactly_once() {
        let (engine, reservations) = one_table_engine();
        let restaurant = demo::restaurant();
        let wanted = request(hm(19, 0), 2);

        let (caller_a, caller_b) = (CustomerId::generate(), CustomerId::generate());

        let (first, second) = tokio::join!(
            engine.reserve(&restaurant, &wanted, &caller_a, "caller-a"),
            engine.reserve(&restaurant, &wanted, &caller_b, "caller-b"),
        );
        let outcomes = [first.expect("reserve"), second.expect("reserve")];

        let booked = outcomes.iter().filter(|outcome| matches!(outcome, Reservation::Booked(_)));
        assert_eq!(booked.count(), 1);
        let refused = outcomes
            .iter()
            .find_map(|outcome| match outcome {
                Reservation::Unavailable(Availability::NoCapacity { alternatives }) => {
                    Some(alternatives.clone())
                }
                _ => None,
            })
            .expect("the loser sees no capacity");
        assert!(!refused.is_empty());
        assert_eq!(reservations.bookings().await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_key_returns_the_existing_booking() {
        let (engine, reservations) = one_table_engine();
        let restaurant = demo::restaurant();
        let wanted = request(hm(12, 0), 2);
        let customer = CustomerId::generate();

        let first = engine.reserve(&restaurant, &wanted, &customer, "same").await.expect("reserve");
        let Reservation::Booked(original) = first else {
            panic!("first reservation should book");
        };

        let replay = engine
            .reserve(&restaurant, &request(hm(15, 0), 2), &customer, "same")
            .await
            .expect("reserve");
        assert_eq!(replay, Reservation::Existing(original));
        assert_eq!(reservations.bookings().await.len(), 1);
    }
}
