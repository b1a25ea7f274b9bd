//! HTTP API for the prospect dialer
//!
//! Actix-web handlers over the `Dialer` engine: session and queue
//! management, click-to-call bridges, dispositions, the telephony webhook
//! ingress and the `/ws` live feed.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

use actix_web::web;

pub use dto::ApiResponse;

/// Operator-facing routes, mounted under `/api/v1`
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .configure(handlers::configure_sessions)
        .configure(handlers::configure_queue_items)
        .configure(handlers::configure_calls);
}

/// Provider-facing and streaming routes, mounted at the root
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.configure(handlers::configure_webhooks)
        .route("/ws", web::get().to(handlers::ws_handler));
}
