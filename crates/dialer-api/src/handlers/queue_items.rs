//! Queue item management

use crate::dto::{ApiResponse, QueueItemPatchRequest};
use actix_web::{web, HttpResponse};
use dialer_auth::AuthenticatedOperator;
use dialer_core::AppError;
use dialer_services::Dialer;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Reprioritize, skip or retry a queued contact
///
/// PATCH /api/v1/queue-items/{id}
#[instrument(skip(dialer, operator, req))]
pub async fn patch_queue_item(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
    req: web::Json<QueueItemPatchRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    let req = req.into_inner();
    if req.is_empty() {
        return Err(AppError::Validation(
            "Patch must set priority or status".to_string(),
        ));
    }

    let item_id = path.into_inner();
    let item = dialer.queue.get(item_id).await?;
    let session = dialer.sessions.get(item.session_id).await?;
    operator.ensure_owns(&session.session.owner_id)?;

    let updated = dialer.queue.update_item(item_id, req.into()).await?;
    info!(item_id = %item_id, status = ?updated.status, "Queue item patched");
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/queue-items/{id}", web::patch().to(patch_queue_item));
}
