use async_trait::async_trait;
use sqlx::Row;

use tablebell_core::domain::menu::{MenuItem, MenuItemId};
use tablebell_core::domain::restaurant::{Restaurant, RestaurantId};
use tablebell_core::domain::table::{DiningTable, TableId};
use tablebell_core::ports::{CatalogProvider, StoreError};

use super::{decode_err, parse_count, parse_decimal, parse_string_list, parse_time};
use super::{RepositoryError, TIME_FORMAT};
use crate::DbPool;

/// Read side of the restaurant catalog: restaurant settings, menu and tables.
pub struct SqlCatalog {
    pool: DbPool,
}

impl SqlCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a restaurant with its full menu and table plan.
    pub async fn save(
        &self,
        restaurant: &Restaurant,
        menu: &[MenuItem],
        tables: &[DiningTable],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO restaurant (
                id, name, opening_time, closing_time, booking_duration_minutes,
                max_party_size, subscription_tier, commission_override_pct,
                delivery_enabled, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                opening_time = excluded.opening_time,
                closing_time = excluded.closing_time,
                booking_duration_minutes = excluded.booking_duration_minutes,
                max_party_size = excluded.max_party_size,
                subscription_tier = excluded.subscription_tier,
                commission_override_pct = excluded.commission_override_pct,
                delivery_enabled = excluded.delivery_enabled",
        )
        .bind(&restaurant.id.0)
        .bind(&restaurant.name)
        .bind(restaurant.opening_time.format(TIME_FORMAT).to_string())
        .bind(restaurant.closing_time.format(TIME_FORMAT).to_string())
        .bind(i64::from(restaurant.booking_duration_minutes))
        .bind(i64::from(restaurant.max_party_size))
        .bind(&restaurant.subscription_tier)
        .bind(restaurant.commission_override_pct.map(|pct| pct.to_string()))
        .bind(restaurant.delivery_enabled)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM menu_item WHERE restaurant_id = ?")
            .bind(&restaurant.id.0)
            .execute(&mut *tx)
            .await?;
        for item in menu {
            let tags = serde_json::to_string(&item.dietary_tags)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            sqlx::query(
                "INSERT INTO menu_item (
                    id, restaurant_id, name, category, description, price,
                    dietary_tags, sort_order, available
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id.0)
            .bind(&restaurant.id.0)
            .bind(&item.name)
            .bind(&item.category)
            .bind(&item.description)
            .bind(item.price.to_string())
            .bind(tags)
            .bind(item.sort_order)
            .bind(item.available)
            .execute(&mut *tx)
            .await?;
        }

        for table in tables {
            sqlx::query(
                "INSERT INTO dining_table (id, restaurant_id, label, capacity, is_active)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    label = excluded.label,
                    capacity = excluded.capacity,
                    is_active = excluded.is_active",
            )
            .bind(table.id.0)
            .bind(&restaurant.id.0)
            .bind(&table.label)
            .bind(i64::from(table.capacity))
            .bind(table.is_active)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_restaurant(
        &self,
        id: &RestaurantId,
    ) -> Result<Option<Restaurant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, opening_time, closing_time, booking_duration_minutes,
                    max_party_size, subscription_tier, commission_override_pct, delivery_enabled
             FROM restaurant WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_restaurant).transpose()
    }

    async fn load_menu(&self, id: &RestaurantId) -> Result<Vec<MenuItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, category, description, price, dietary_tags,
                    sort_order, available
             FROM menu_item WHERE restaurant_id = ?
             ORDER BY sort_order, id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_menu_item).collect()
    }

    async fn load_tables(&self, id: &RestaurantId) -> Result<Vec<DiningTable>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, label, capacity, is_active
             FROM dining_table WHERE restaurant_id = ?
             ORDER BY capacity, id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_table).collect()
    }
}

fn row_to_restaurant(row: &sqlx::sqlite::SqliteRow) -> Result<Restaurant, RepositoryError> {
    let opening: String = row.try_get("opening_time").map_err(decode_err)?;
    let closing: String = row.try_get("closing_time").map_err(decode_err)?;
    let duration: i64 = row.try_get("booking_duration_minutes").map_err(decode_err)?;
    let max_party: i64 = row.try_get("max_party_size").map_err(decode_err)?;
    let override_pct: Option<String> =
        row.try_get("commission_override_pct").map_err(decode_err)?;

    Ok(Restaurant {
        id: RestaurantId(row.try_get("id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        opening_time: parse_time("opening_time", &opening)?,
        closing_time: parse_time("closing_time", &closing)?,
        booking_duration_minutes: parse_count("booking_duration_minutes", duration)?,
        max_party_size: parse_count("max_party_size", max_party)?,
        subscription_tier: row.try_get("subscription_tier").map_err(decode_err)?,
        commission_override_pct: override_pct
            .map(|pct| parse_decimal("commission_override_pct", &pct))
            .transpose()?,
        delivery_enabled: row.try_get("delivery_enabled").map_err(decode_err)?,
    })
}

fn row_to_menu_item(row: &sqlx::sqlite::SqliteRow) -> Result<MenuItem, RepositoryError> {
    let price: String = row.try_get("price").map_err(decode_err)?;
    let tags: String = row.try_get("dietary_tags").map_err(decode_err)?;

    Ok(MenuItem {
        id: MenuItemId(row.try_get("id").map_err(decode_err)?),
        restaurant_id: RestaurantId(row.try_get("restaurant_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        category: row.try_get("category").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        price: parse_decimal("price", &price)?,
        dietary_tags: parse_string_list("dietary_tags", &tags)?,
        sort_order: row.try_get("sort_order").map_err(decode_err)?,
        available: row.try_get("available").map_err(decode_err)?,
    })
}

fn row_to_table(row: &sqlx::sqlite::SqliteRow) -> Result<DiningTable, RepositoryError> {
    let capacity: i64 = row.try_get("capacity").map_err(decode_err)?;

    Ok(DiningTable {
        id: TableId(row.try_get("id").map_err(decode_err)?),
        restaurant_id: RestaurantId(row.try_get("restaurant_id").map_err(decode_err)?),
        label: row.try_get("label").map_err(decode_err)?,
        capacity: parse_count("capacity", capacity)?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
    })
}

#[async_trait]
impl CatalogProvider for SqlCatalog {
    async fn restaurant(&self, id: &RestaurantId) -> Result<Option<Restaurant>, StoreError> {
        Ok(self.load_restaurant(id).await?)
    }

    async fn menu(&self, id: &RestaurantId) -> Result<Vec<MenuItem>, StoreError> {
        Ok(self.load_menu(id).await?)
    }

    async fn tables(&self, id: &RestaurantId) -> Result<Vec<DiningTable>, StoreError> {
        Ok(self.load_tables(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tablebell_core::demo;
    use tablebell_core::domain::restaurant::RestaurantId;
    use tablebell_core::ports::CatalogProvider;

    use super::SqlCatalog;
    use crate::{connect_with_settings, migrations::run_pending};

    async fn catalog() -> SqlCatalog {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlCatalog::new(pool)
    }

    #[tokio::test]
    async fn saved_restaurant_reads_back_with_catalog_ordering() {
        let catalog = catalog().await;
        let mut menu = demo::menu();
        menu.reverse();
        catalog.save(&demo::restaurant(), &menu, &demo::tables()).await.expect("save");

        let id = RestaurantId(demo::DEMO_RESTAURANT_ID.to_string());
        let restaurant = catalog.restaurant(&id).await.expect("load").expect("present");
        assert_eq!(restaurant, demo::restaurant());

        let loaded = catalog.menu(&id).await.expect("menu");
        assert_eq!(loaded, demo::menu());
        assert_eq!(catalog.tables(&id).await.expect("tables").len(), demo::tables().len());
    }

    #[tokio::test]
    async fn saving_again_replaces_menu_and_updates_settings() {
        let catalog = catalog().await;
        let mut restaurant = demo::restaurant();
        catalog.save(&restaurant, &demo::menu(), &demo::tables()).await.expect("save");

        restaurant.commission_override_pct = Some(Decimal::new(125, 1));
        let menu = demo::menu().into_iter().take(2).collect::<Vec<_>>();
        catalog.save(&restaurant, &menu, &demo::tables()).await.expect("resave");

        let loaded = catalog.restaurant(&restaurant.id).await.expect("load").expect("present");
        assert_eq!(loaded.commission_override_pct, Some(Decimal::new(125, 1)));
        assert_eq!(catalog.menu(&restaurant.id).await.expect("menu").len(), 2);
    }

    #[tokio::test]
    async fn unknown_restaurant_has_no_catalog() {
        let catalog = catalog().await;
        let id = RestaurantId("nowhere".to_string());

        assert!(catalog.restaurant(&id).await.expect("load").is_none());
        assert!(catalog.menu(&id).await.expect("menu").is_empty());
    }
}
