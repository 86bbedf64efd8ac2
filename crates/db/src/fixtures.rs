use tablebell_core::demo;
use tablebell_core::domain::restaurant::RestaurantId;
use tablebell_core::ports::CatalogProvider;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlCatalog};

/// Deterministic demo restaurant: the catalog a fresh install can take
/// calls against.
pub struct DemoSeed;

impl DemoSeed {
    /// Loads (or refreshes) the demo restaurant, its menu and table plan.
    /// Running it twice leaves the same rows in place.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let restaurant = demo::restaurant();
        let menu = demo::menu();
        let tables = demo::tables();

        SqlCatalog::new(pool.clone()).save(&restaurant, &menu, &tables).await?;

        Ok(SeedResult {
            restaurant_id: restaurant.id.0,
            menu_items: menu.len(),
            tables: tables.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        let catalog = SqlCatalog::new(pool.clone());
        let id = RestaurantId(demo::DEMO_RESTAURANT_ID.to_string());

        let restaurant = catalog.restaurant(&id).await.map_err(store_to_repo)?;
        checks.push(("demo-restaurant", restaurant.as_ref() == Some(&demo::restaurant())));

        let menu = catalog.menu(&id).await.map_err(store_to_repo)?;
        let expected_ids = demo::menu().into_iter().map(|item| item.id).collect::<Vec<_>>();
        let menu_ids = menu.into_iter().map(|item| item.id).collect::<Vec<_>>();
        checks.push(("demo-menu", menu_ids == expected_ids));

        let tables = catalog.tables(&id).await.map_err(store_to_repo)?;
        let seats = tables.iter().map(|table| table.capacity).sum::<u32>();
        let expected_seats = demo::tables().iter().map(|table| table.capacity).sum::<u32>();
        checks.push(("demo-tables", tables.len() == demo::tables().len()));
        checks.push(("demo-seats", seats == expected_seats));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo restaurant and everything that references it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM food_order_line WHERE order_id IN
                (SELECT id FROM food_order WHERE restaurant_id = ?)",
        )
        .bind(demo::DEMO_RESTAURANT_ID)
        .execute(&mut *tx)
        .await?;
        for table in ["food_order", "booking", "audit_event", "dining_table", "menu_item"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE restaurant_id = ?"))
                .bind(demo::DEMO_RESTAURANT_ID)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM restaurant WHERE id = ?")
            .bind(demo::DEMO_RESTAURANT_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn store_to_repo(error: tablebell_core::ports::StoreError) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

#[derive(Debug)]
pub struct SeedResult {
    pub restaurant_id: String,
    pub menu_items: usize,
    pub tables: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
