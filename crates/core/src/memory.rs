//! In-process collaborator implementations.
//!
//! These back the unit tests and local runs without a database. The
//! reservation store serializes check-and-insert behind one async mutex so it
//! gives the same no-overlap guarantee as the SQL conditional insert.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use crate::audit::InMemoryAuditSink;
use crate::commission::TieredCommissionResolver;
use crate::config::CommissionConfig;
use crate::domain::booking::{Booking, SeatingInterval};
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::menu::{sort_catalog, MenuItem};
use crate::domain::order::Order;
use crate::domain::restaurant::{Restaurant, RestaurantId};
use crate::domain::table::DiningTable;
use crate::ports::{
    CatalogProvider, Clock, Collaborators, CustomerStore, OrderInsertOutcome, OrderStore,
    ReservationStore, ReserveOutcome, StoreError,
};

#[derive(Default)]
pub struct InMemoryCatalog {
    restaurants: BTreeMap<RestaurantId, Restaurant>,
    menus: BTreeMap<RestaurantId, Vec<MenuItem>>,
    tables: BTreeMap<RestaurantId, Vec<DiningTable>>,
}

impl InMemoryCatalog {
    pub fn with_restaurant(
        mut self,
        restaurant: Restaurant,
        mut menu: Vec<MenuItem>,
        tables: Vec<DiningTable>,
    ) -> Self {
        sort_catalog(&mut menu);
        self.menus.insert(restaurant.id.clone(), menu);
        self.tables.insert(restaurant.id.clone(), tables);
        self.restaurants.insert(restaurant.id.clone(), restaurant);
        self
    }
}

#[async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn restaurant(&self, id: &RestaurantId) -> Result<Option<Restaurant>, StoreError> {
        Ok(self.restaurants.get(id).cloned())
    }

    async fn menu(&self, id: &RestaurantId) -> Result<Vec<MenuItem>, StoreError> {
        Ok(self.menus.get(id).cloned().unwrap_or_default())
    }

    async fn tables(&self, id: &RestaurantId) -> Result<Vec<DiningTable>, StoreError> {
        Ok(self.tables.get(id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryReservationStore {
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryReservationStore {
    pub async fn bookings(&self) -> Vec<Booking> {
        self.bookings.lock().await.clone()
    }

    pub async fn insert_unchecked(&self, booking: Booking) {
        self.bookings.lock().await.push(booking);
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn bookings_overlapping(
        &self,
        restaurant_id: &RestaurantId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> Result<Vec<Booking>, StoreError> {
        let window = SeatingInterval { start: window_start, end: window_end };
        Ok(self
            .bookings
            .lock()
            .await
            .iter()
            .filter(|booking| {
                &booking.restaurant_id == restaurant_id
                    && booking.status.holds_table()
                    && booking.interval().overlaps(&window)
            })
            .cloned()
            .collect())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError> {
        let bookings = self.bookings.lock().await;
        Ok(bookings.iter().find(|booking| booking.idempotency_key == key).cloned())
    }

    async fn try_reserve(&self, booking: Booking) -> Result<ReserveOutcome, StoreError> {
        let mut bookings = self.bookings.lock().await;
        if let Some(existing) =
            bookings.iter().find(|existing| existing.idempotency_key == booking.idempotency_key)
        {
            return Ok(ReserveOutcome::Duplicate(existing.clone()));
        }
        let interval = booking.interval();
        if bookings.iter().any(|existing| existing.conflicts_with(booking.table_id, &interval)) {
            return Ok(ReserveOutcome::TableConflict);
        }
        bookings.push(booking.clone());
        Ok(ReserveOutcome::Reserved(booking))
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderStore {
    pub async fn orders(&self) -> Vec<Order> {
        self.orders.lock().await.clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().await.iter().find(|order| order.idempotency_key == key).cloned())
    }

    async fn insert(&self, order: Order) -> Result<OrderInsertOutcome, StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(existing) =
            orders.iter().find(|existing| existing.idempotency_key == order.idempotency_key)
        {
            return Ok(OrderInsertOutcome::Duplicate(existing.clone()));
        }
        orders.push(order.clone());
        Ok(OrderInsertOutcome::Created(order))
    }
}

#[derive(Default)]
pub struct InMemoryCustomerStore {
    customers: Mutex<BTreeMap<String, Customer>>,
}

impl InMemoryCustomerStore {
    pub async fn customers(&self) -> Vec<Customer> {
        self.customers.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn upsert_by_phone(&self, phone: &str, name: &str) -> Result<Customer, StoreError> {
        let mut customers = self.customers.lock().await;
        let customer = customers.entry(phone.to_string()).or_insert_with(|| Customer {
            id: CustomerId::generate(),
            phone: phone.to_string(),
            name: name.to_string(),
        });
        customer.name = name.to_string();
        Ok(customer.clone())
    }
}

/// Handles to every in-memory store, kept so tests can inspect writes.
#[derive(Clone)]
pub struct InMemoryStores {
    pub catalog: Arc<InMemoryCatalog>,
    pub reservations: Arc<InMemoryReservationStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub customers: Arc<InMemoryCustomerStore>,
    pub audit: InMemoryAuditSink,
}

impl InMemoryStores {
    pub fn new(catalog: InMemoryCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            reservations: Arc::new(InMemoryReservationStore::default()),
            orders: Arc::new(InMemoryOrderStore::default()),
            customers: Arc::new(InMemoryCustomerStore::default()),
            audit: InMemoryAuditSink::default(),
        }
    }

    /// The demo restaurant with nothing booked or ordered yet.
    pub fn demo() -> Self {
        Self::new(InMemoryCatalog::default().with_restaurant(
            crate::demo::restaurant(),
            crate::demo::menu(),
            crate::demo::tables(),
        ))
    }

    pub fn collaborators(
        &self,
        commission: CommissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Collaborators {
        Collaborators {
            catalog: self.catalog.clone(),
            reservations: self.reservations.clone(),
            orders: self.orders.clone(),
            customers: self.customers.clone(),
            commission: Arc::new(TieredCommissionResolver::new(commission)),
            audit: Arc::new(self.audit.clone()),
            clock,
        }
    }
}
