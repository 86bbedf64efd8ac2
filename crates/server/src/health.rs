use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tablebell_db::{ping, DbPool};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    extractor: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub detail: String,
    /// Absent when the catalog could not be read.
    pub restaurants: Option<i64>,
    pub extractor: &'static str,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, extractor: &'static str) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, extractor })
}

/// 503 only when the database is gone; an empty catalog is still "ready".
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let checked_at = Utc::now().to_rfc3339();

    if let Err(error) = ping(&state.db_pool).await {
        let payload = HealthResponse {
            status: "degraded",
            database: "unreachable",
            detail: format!("database query failed: {error}"),
            restaurants: None,
            extractor: state.extractor,
            checked_at,
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(payload));
    }

    let restaurants = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM restaurant")
        .fetch_one(&state.db_pool)
        .await
        .ok();
    let detail = match restaurants {
        Some(count) => format!("{count} restaurant(s) taking calls"),
        None => "catalog not migrated".to_string(),
    };

    let payload = HealthResponse {
        status: "ready",
        database: "ready",
        detail,
        restaurants,
        extractor: state.extractor,
        checked_at,
    };
    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::{extract::State, Json};
    use tablebell_db::{connect_with_settings, migrations, DemoSeed};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn seeded_database_reports_ready_with_restaurant_count() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrate");
        DemoSeed::load(&pool).await.expect("seed");

        let response = router(pool.clone(), "rule_based")
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), 1 << 16).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["restaurants"], 1);
        assert_eq!(payload["extractor"], "rule_based");

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_database_is_ready_without_a_catalog() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), extractor: "http" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.restaurants, None);
        assert_eq!(payload.detail, "catalog not migrated");
        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_is_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, extractor: "rule_based" })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database, "unreachable");
    }
}
