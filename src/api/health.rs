use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub storage: bool,
    pub search: bool,
    pub timestamp: i64,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let db_ok = state.db.ping().await;

    let body = HealthResponse {
        status: if db_ok { "healthy" } else { "degraded" }.to_string(),
        service: "constitutional-archive".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if db_ok { "connected" } else { "unreachable" }.to_string(),
        storage: state.blob.is_some(),
        search: state.search.is_some(),
        timestamp: chrono::Utc::now().timestamp(),
    };

    if db_ok {
        HttpResponse::Ok().json(body)
    } else {
        log::warn!("⚠️  Health check: database unreachable");
        HttpResponse::ServiceUnavailable().json(body)
    }
}
