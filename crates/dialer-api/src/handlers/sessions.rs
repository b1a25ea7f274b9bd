//! Session handlers
//!
//! Power-dial session lifecycle and the session's queue. Every route acts on
//! a session owned by the authenticated operator.

use crate::dto::{
    ApiResponse, EnqueueRequest, RemoveContactsRequest, RemoveContactsResponse,
    StartSessionRequest,
};
use actix_web::{web, HttpResponse};
use dialer_auth::AuthenticatedOperator;
use dialer_core::AppError;
use dialer_services::{Dialer, SessionView};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

async fn owned_session(
    dialer: &Dialer,
    operator: &AuthenticatedOperator,
    id: Uuid,
) -> Result<SessionView, AppError> {
    let view = dialer.sessions.get(id).await?;
    operator.ensure_owns(&view.session.owner_id)?;
    Ok(view)
}

/// Start a session for the caller
///
/// POST /api/v1/sessions
#[instrument(skip(dialer, operator, req), fields(operator = %operator.operator_id))]
pub async fn start_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    req: web::Json<StartSessionRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Start session validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;
    let req = req.into_inner();

    let started = dialer
        .sessions
        .start(
            &operator.operator_id,
            &req.caller_id_number,
            &req.contact_ids,
            req.priority,
        )
        .await?;

    info!(
        session_id = %started.session.id,
        queued = started.enqueued.added.len(),
        "Session started"
    );
    Ok(HttpResponse::Created().json(ApiResponse::success(started)))
}

/// The caller's open session, if any
///
/// GET /api/v1/sessions/active
pub async fn active_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
) -> Result<HttpResponse, AppError> {
    let view = dialer.sessions.active_for(&operator.operator_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = owned_session(&dialer, &operator, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

/// POST /api/v1/sessions/{id}/pause
#[instrument(skip(dialer, operator))]
pub async fn pause_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;
    let session = dialer.sessions.pause(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// POST /api/v1/sessions/{id}/resume
#[instrument(skip(dialer, operator))]
pub async fn resume_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;
    let session = dialer.sessions.resume(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// POST /api/v1/sessions/{id}/stop
#[instrument(skip(dialer, operator))]
pub async fn stop_session(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;
    let session = dialer.sessions.stop(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// Advance the queue and ring the next contact
///
/// POST /api/v1/sessions/{id}/dial-next
#[instrument(skip(dialer, operator))]
pub async fn dial_next(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;
    let outcome = dialer.sessions.dial_next(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}

/// GET /api/v1/sessions/{id}/queue
pub async fn list_queue(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;
    let items = dialer.queue.list(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(items)))
}

/// POST /api/v1/sessions/{id}/queue
#[instrument(skip(dialer, operator, req))]
pub async fn enqueue(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
    req: web::Json<EnqueueRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    let id = path.into_inner();
    let view = owned_session(&dialer, &operator, id).await?;
    if !view.session.status.is_open() {
        return Err(AppError::InvalidSessionState(format!(
            "session {} is {}",
            id, view.session.status
        )));
    }

    let result = dialer.queue.enqueue(id, &req.contact_ids, req.priority).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

/// DELETE /api/v1/sessions/{id}/queue
#[instrument(skip(dialer, operator, req))]
pub async fn remove_from_queue(
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
    path: web::Path<Uuid>,
    req: web::Json<RemoveContactsRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    let id = path.into_inner();
    owned_session(&dialer, &operator, id).await?;

    let removed = dialer.queue.remove(id, &req.contact_ids).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(RemoveContactsResponse { removed })))
}

/// Configure session routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("", web::post().to(start_session))
            .route("/active", web::get().to(active_session))
            .route("/{id}", web::get().to(get_session))
            .route("/{id}/pause", web::post().to(pause_session))
            .route("/{id}/resume", web::post().to(resume_session))
            .route("/{id}/stop", web::post().to(stop_session))
            .route("/{id}/dial-next", web::post().to(dial_next))
            .route("/{id}/queue", web::get().to(list_queue))
            .route("/{id}/queue", web::post().to(enqueue))
            .route("/{id}/queue", web::delete().to(remove_from_queue)),
    );
}
