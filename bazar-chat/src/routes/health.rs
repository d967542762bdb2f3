use axum::Json;

use bazar_shared::types::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("bazar-chat", env!("CARGO_PKG_VERSION")))
}
