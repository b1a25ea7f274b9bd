//! Telephony webhook ingress
//!
//! The provider retries any non-2xx answer, so the contract is narrow: 400
//! for a body that is not JSON, 5xx when the event could not be persisted,
//! 200 for everything else including event types the dialer ignores.

use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use dialer_services::{Dialer, Submission};
use dialer_telephony::{parse_webhook, ParsedWebhook};
use tracing::{debug, instrument};

/// POST /webhooks/telephony
#[instrument(skip(dialer, body), fields(bytes = body.len()))]
pub async fn receive_webhook(
    dialer: web::Data<Dialer>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let event = match parse_webhook(&body)? {
        ParsedWebhook::Event(event) => event,
        ParsedWebhook::Ignored(reason) => {
            debug!("Ignoring webhook: {}", reason);
            return Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ignored" })));
        }
    };

    let status = match dialer.webhooks.submit(event).await? {
        Submission::Accepted => "accepted",
        Submission::Duplicate => "duplicate",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": status })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/telephony", web::post().to(receive_webhook));
}
