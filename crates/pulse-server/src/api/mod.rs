//! Read-only HTTP surface over [`Insights`]
//!
//! Import status is always served. Analytics routes answer `503` until the
//! first precompute pass has finished.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::accessor::Insights;
use crate::analytics::{FailureRate, KycFunnel, ProductAdoption, TopMerchant};
use crate::config::CorsConfig;
use crate::db;
use crate::error::AppError;
use crate::middleware;

#[derive(Clone)]
pub struct AppState {
    pub insights: Insights,
    /// `None` when running against an in-memory store
    pub db: Option<PgPool>,
}

#[derive(Debug, Serialize)]
pub struct ImportStatus {
    pub complete: bool,
    pub total_imported: u64,
    pub total_skipped: u64,
    pub analytics_ready: bool,
}

pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/import/status", get(import_status))
        .route("/analytics/top-merchant", get(top_merchant))
        .route("/analytics/monthly-active-merchants", get(monthly_active_merchants))
        .route("/analytics/product-adoption", get(product_adoption))
        .route("/analytics/kyc-funnel", get(kyc_funnel))
        .route("/analytics/failure-rates", get(failure_rates))
        .with_state(state)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn health(State(state): State<AppState>) -> Response {
    let Some(pool) = state.db.as_ref() else {
        return (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response();
    };

    match db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn import_status(State(state): State<AppState>) -> Json<ImportStatus> {
    let insights = &state.insights;
    Json(ImportStatus {
        complete: insights.is_import_complete(),
        total_imported: insights.total_imported(),
        total_skipped: insights.total_skipped(),
        analytics_ready: insights.is_analytics_ready(),
    })
}

async fn top_merchant(State(state): State<AppState>) -> Result<Json<Option<TopMerchant>>, AppError> {
    Ok(Json(state.insights.top_merchant()?))
}

async fn monthly_active_merchants(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, i64>>, AppError> {
    Ok(Json(state.insights.monthly_active_merchants()?))
}

async fn product_adoption(State(state): State<AppState>) -> Result<Json<ProductAdoption>, AppError> {
    Ok(Json(state.insights.product_adoption()?))
}

async fn kyc_funnel(State(state): State<AppState>) -> Result<Json<KycFunnel>, AppError> {
    Ok(Json(state.insights.kyc_funnel()?))
}

async fn failure_rates(State(state): State<AppState>) -> Result<Json<Vec<FailureRate>>, AppError> {
    Ok(Json(state.insights.failure_rates()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::analytics::AnalyticsCache;
    use crate::ingest::ImportTotals;
    use crate::models::Product;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AnalyticsCache>, Arc<ImportTotals>) {
        let totals = Arc::new(ImportTotals::new());
        let cache = Arc::new(AnalyticsCache::new());
        let state = AppState {
            insights: Insights::new(totals.clone(), cache.clone()),
            db: None,
        };
        let cors = CorsConfig {
            allowed_origins: vec!["*".to_string()],
        };
        (create_router(state, &cors), cache, totals)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_analytics_unavailable_before_ready() {
        let (app, _, _) = app();
        let (status, body) = get_json(app, "/analytics/failure-rates").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["status"], 503);
    }

    #[tokio::test]
    async fn test_import_status_served_before_ready() {
        let (app, _, totals) = app();
        totals.mark_complete();
        let (status, body) = get_json(app, "/import/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["complete"], true);
        assert_eq!(body["analytics_ready"], false);
    }

    #[tokio::test]
    async fn test_product_adoption_keeps_order() {
        let (app, cache, _) = app();
        cache.set_product_adoption(crate::analytics::projections::product_adoption([
            (Product::Bills, 2),
            (Product::Pos, 9),
        ]));
        cache.mark_ready();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/analytics/product-adoption")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"POS":9,"BILLS":2}"#);
    }

    #[tokio::test]
    async fn test_top_merchant_null_when_no_successes() {
        let (app, cache, _) = app();
        cache.mark_ready();
        let (status, body) = get_json(app, "/analytics/top-merchant").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let (app, _, _) = app();
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
