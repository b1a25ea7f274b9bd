//! HTTP contract tests over the in-memory store

use actix_web::{test, web, App};
use async_trait::async_trait;
use dialer_api::{configure_api, configure_public};
use dialer_auth::JwtService;
use dialer_core::config::DialerConfig;
use dialer_core::traits::{DialRequest, TelephonyProvider};
use dialer_core::AppResult;
use dialer_db::MemoryStore;
use dialer_services::Dialer;
use serde_json::{json, Value};
use std::sync::Arc;

/// Provider that accepts every command
struct AcceptAll;

#[async_trait]
impl TelephonyProvider for AcceptAll {
    async fn dial(&self, request: &DialRequest) -> AppResult<String> {
        Ok(format!("v3:{}", request.to))
    }

    async fn bridge(&self, _call_control_id: &str, _other: &str) -> AppResult<()> {
        Ok(())
    }

    async fn hangup(&self, _call_control_id: &str) -> AppResult<()> {
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    dialer: web::Data<Dialer>,
    jwt: Arc<JwtService>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store.add_contact(7, "Carol", Some("+15553334444"));
    let dialer = Dialer::new(
        store.repositories(),
        Arc::new(AcceptAll),
        DialerConfig::default(),
    );
    Fixture {
        store,
        dialer: web::Data::new(dialer),
        jwt: Arc::new(JwtService::new("test-secret-key-12345", 3600)),
    }
}

impl Fixture {
    fn bearer(&self, operator: &str) -> (&'static str, String) {
        let token = self.jwt.create_token_for_operator(operator).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }
}

macro_rules! app {
    ($fx:expr) => {
        test::init_service(
            App::new()
                .app_data($fx.dialer.clone())
                .app_data(web::Data::new($fx.jwt.clone()))
                .service(web::scope("/api/v1").configure(configure_api))
                .configure(configure_public),
        )
        .await
    };
}

#[actix_web::test]
async fn test_webhook_rejects_non_json() {
    let fx = fixture();
    let app = app!(fx);

    let req = test::TestRequest::post()
        .uri("/webhooks/telephony")
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_webhook_acknowledges_unknown_event_types() {
    let fx = fixture();
    let app = app!(fx);

    let req = test::TestRequest::post()
        .uri("/webhooks/telephony")
        .set_json(json!({
            "data": {
                "event_type": "call.speak.ended",
                "id": "evt-speak",
                "payload": {"call_control_id": "v3:x"}
            }
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ignored");
    assert_eq!(fx.store.is_event_processed("evt-speak"), None);
}

#[actix_web::test]
async fn test_webhook_persists_before_acknowledging() {
    let fx = fixture();
    let app = app!(fx);

    let envelope = json!({
        "data": {
            "event_type": "call.answered",
            "id": "evt-answered",
            "occurred_at": "2024-05-01T10:00:00Z",
            "payload": {"call_control_id": "v3:unknown"}
        }
    });

    let req = test::TestRequest::post()
        .uri("/webhooks/telephony")
        .set_json(&envelope)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(fx.store.is_event_processed("evt-answered"), Some(false));

    let req = test::TestRequest::post()
        .uri("/webhooks/telephony")
        .set_json(&envelope)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "duplicate");
}

#[actix_web::test]
async fn test_routes_require_a_token() {
    let fx = fixture();
    let app = app!(fx);

    let req = test::TestRequest::get()
        .uri("/api/v1/sessions/active")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_session_start_and_dial_next() {
    let fx = fixture();
    let app = app!(fx);

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions")
        .insert_header(fx.bearer("agent-1"))
        .set_json(json!({"contactIds": [7], "callerIdNumber": "+15555556666"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    let session_id = body["data"]["session"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["enqueued"]["added"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/dial-next", session_id))
        .insert_header(fx.bearer("agent-1"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "dialing");
    assert_eq!(body["data"]["leg"]["to_number"], "+15553334444");
    assert_eq!(body["data"]["leg"]["contact_name"], "Carol");

    // Only one call at a time
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/sessions/{}/dial-next", session_id))
        .insert_header(fx.bearer("agent-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // Another operator cannot see it
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{}", session_id))
        .insert_header(fx.bearer("agent-2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn test_disposition_waits_for_hangup() {
    let fx = fixture();
    let app = app!(fx);

    let started = fx
        .dialer
        .sessions
        .start("agent-1", "+15555556666", &[7], None)
        .await
        .unwrap();
    let leg = match fx.dialer.sessions.dial_next(started.session.id).await.unwrap() {
        dialer_services::DialOutcome::Dialing { leg, .. } => leg,
        other => panic!("unexpected {:?}", other),
    };

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/calls/{}/disposition", leg.id))
        .insert_header(fx.bearer("agent-1"))
        .set_json(json!({"outcome": "interested"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/calls/{}/disposition", leg.id))
        .insert_header(fx.bearer("agent-1"))
        .set_json(json!({"outcome": "sort_of"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_bridge_trigger_contract() {
    let fx = fixture();
    let app = app!(fx);

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/bridge")
        .insert_header(fx.bearer("agent-1"))
        .set_json(json!({
            "leadPhone": "not-a-number",
            "fromNumber": "+15555556666",
            "cellPhone": "+15551112222"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(fx.store.bridge_count(), 0);

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/bridge")
        .insert_header(fx.bearer("agent-1"))
        .set_json(json!({
            "leadPhone": "+15553334444",
            "fromNumber": "+15555556666",
            "contactId": 7,
            "cellPhone": "+15551112222"
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["callControlId"], "v3:+15551112222");
    assert_eq!(body["data"]["status"], "pending");

    let req = test::TestRequest::get()
        .uri("/api/v1/calls/bridge/v3:+15551112222")
        .insert_header(fx.bearer("agent-2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
