//! Call handlers
//!
//! Click-to-call bridge triggers, call leg lookup and dispositions.

use crate::dto::{ApiResponse, BridgeTriggerRequest, BridgeTriggerResponse, DispositionRequest};
use actix_web::{web, HttpResponse};
use dialer_auth::AuthenticatedOperator;
use dialer_core::models::CallLeg;
use dialer_core::AppError;
use dialer_services::Dialer;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Inbound legs have no operator and are visible to everyone
fn ensure_leg_access(operator: &AuthenticatedOperator, leg: &CallLeg) -> Result<(), AppError> {
    match leg.operator_id.as_deref() {
        Some(owner) => operator.ensure_owns(owner),
        None => Ok(()),
    }
}

/// Ring the operator's cell, then the prospect once it answers
///
/// POST /api/v1/calls/bridge
#[instrument(skip(dialer, operator, req), fields(operator = %operator.operator_id))]
pub async fn trigger_bridge(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    req: web::Json<BridgeTriggerRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Bridge trigger validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let trigger = req.into_inner().into_trigger(operator.operator_id.clone());
    let request = dialer.bridges.request_bridge(trigger).await?;

    info!(
        bridge_id = %request.id,
        call_control_id = %request.leg_a_call_id,
        "Bridge requested"
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(BridgeTriggerResponse::from(
        &request,
    ))))
}

/// Poll a bridge by its leg A call-control id
///
/// GET /api/v1/calls/bridge/{call_control_id}
pub async fn bridge_status(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let request = dialer.bridges.find_by_leg_a(&path.into_inner()).await?;
    operator.ensure_owns(&request.operator_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(request)))
}

/// GET /api/v1/calls/{id}
pub async fn get_call(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let leg = dialer.tracker.get(path.into_inner()).await?;
    ensure_leg_access(&operator, &leg)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(leg)))
}

/// Record the outcome of a finished call
///
/// POST /api/v1/calls/{id}/disposition
#[instrument(skip(dialer, operator, req))]
pub async fn set_disposition(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
    req: web::Json<DispositionRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    let leg_id = path.into_inner();
    let leg = dialer.tracker.get(leg_id).await?;
    ensure_leg_access(&operator, &leg)?;

    let req = req.into_inner();
    let result = dialer
        .dispositions
        .set_disposition(leg_id, req.outcome, req.notes.as_deref())
        .await?;

    if let Some(reason) = &result.advance_error {
        warn!(leg_id = %leg_id, "Disposition saved but next dial failed: {}", reason);
    }
    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("/bridge", web::post().to(trigger_bridge))
            .route("/bridge/{call_control_id}", web::get().to(bridge_status))
            .route("/{id}", web::get().to(get_call))
            .route("/{id}/disposition", web::post().to(set_disposition)),
    );
}
