//! Liveness probe

use actix_web::HttpResponse;

/// GET /health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "prospect-dialer",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
