//! WebSocket live feed
//!
//! Streams `DialerEvent`s to the operator's UI as `{type, data}` JSON. A
//! client sees its own sessions, legs and bridges plus unowned inbound legs.
//! Queue items carry no operator, so they are matched against the sessions
//! this connection has seen.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, Session};
use dialer_auth::AuthenticatedOperator;
use dialer_services::{Dialer, DialerEvent};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Replies to client messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WsReply {
    Pong,
    Error { message: String },
}

/// Which events a connection may see
struct FeedFilter {
    operator_id: String,
    sessions: HashSet<Uuid>,
}

impl FeedFilter {
    fn new(operator_id: String) -> Self {
        Self {
            operator_id,
            sessions: HashSet::new(),
        }
    }

    fn admits(&mut self, event: &DialerEvent) -> bool {
        match event {
            DialerEvent::QueueItemUpdated(item) => self.sessions.contains(&item.session_id),
            DialerEvent::SessionUpdated(session) => {
                let mine = session.owner_id == self.operator_id;
                if mine {
                    self.sessions.insert(session.id);
                }
                mine
            }
            DialerEvent::LegUpdated(leg) => leg
                .operator_id
                .as_deref()
                .map_or(true, |owner| owner == self.operator_id),
            other => other.operator_id() == Some(self.operator_id.as_str()),
        }
    }
}

/// WebSocket connection handler
///
/// GET /ws
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    dialer: web::Data<Dialer>,
    operator: AuthenticatedOperator,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let mut filter = FeedFilter::new(operator.operator_id.clone());
    match dialer.sessions.active_for(&operator.operator_id).await {
        Ok(Some(view)) => {
            filter.sessions.insert(view.session.id);
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to load active session for feed: {}", e),
    }

    info!(operator = %operator.operator_id, "WebSocket connection established");

    let feed = dialer.bus.subscribe();
    actix_web::rt::spawn(async move {
        ws_session(session, msg_stream, feed, filter).await;
    });

    Ok(response)
}

async fn send_json<T: Serialize>(session: &mut Session, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => session.text(json).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize feed message: {}", e);
            true
        }
    }
}

async fn ws_session(
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
    mut feed: broadcast::Receiver<DialerEvent>,
    mut filter: FeedFilter,
) {
    let operator = filter.operator_id.clone();
    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            Some(msg) = msg_stream.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        if text.contains("ping") {
                            let _ = send_json(&mut session, &WsReply::Pong).await;
                        } else {
                            debug!(operator = %operator, "Ignoring client text: {}", text);
                        }
                    }
                    Ok(Message::Ping(msg)) => {
                        if session.pong(&msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(reason)) => {
                        info!(operator = %operator, "Client closed connection: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(operator = %operator, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            event = feed.recv() => {
                match event {
                    Ok(event) => {
                        if filter.admits(&event) && !send_json(&mut session, &event).await {
                            warn!(operator = %operator, "Failed to send update, closing connection");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(operator = %operator, "Feed lagged, {} events dropped", skipped);
                        let reply = WsReply::Error {
                            message: format!("{} updates were dropped, refresh state", skipped),
                        };
                        if !send_json(&mut session, &reply).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = ping_interval.tick() => {
                if session.ping(b"").await.is_err() {
                    warn!(operator = %operator, "Failed to send ping, closing connection");
                    break;
                }
            }
        }
    }

    info!(operator = %operator, "WebSocket connection closed");
    let _ = session.close(None).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::{CallDirection, CallLeg, DialSession, QueueItem};

    #[test]
    fn test_filter_tracks_own_sessions() {
        let mut filter = FeedFilter::new("agent-1".to_string());

        let mine = DialSession::new("agent-1", "+15555556666");
        let theirs = DialSession::new("agent-2", "+15555556666");
        assert!(filter.admits(&DialerEvent::SessionUpdated(mine.clone())));
        assert!(!filter.admits(&DialerEvent::SessionUpdated(theirs.clone())));

        let own_item = QueueItem::new(mine.id, 1, 0, 1);
        let other_item = QueueItem::new(theirs.id, 2, 0, 2);
        assert!(filter.admits(&DialerEvent::QueueItemUpdated(own_item)));
        assert!(!filter.admits(&DialerEvent::QueueItemUpdated(other_item)));
    }

    #[test]
    fn test_filter_legs() {
        let mut filter = FeedFilter::new("agent-1".to_string());
        let mut leg = CallLeg::new("v3:a", "+15555556666", "+15553334444", CallDirection::Inbound);
        assert!(filter.admits(&DialerEvent::LegUpdated(leg.clone())));

        leg.operator_id = Some("agent-2".to_string());
        assert!(!filter.admits(&DialerEvent::LegUpdated(leg.clone())));

        leg.operator_id = Some("agent-1".to_string());
        assert!(filter.admits(&DialerEvent::LegUpdated(leg)));
    }

    #[test]
    fn test_reply_shape() {
        let json = serde_json::to_value(WsReply::Pong).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "pong" }));
    }
}
