//! HTTP request handlers

pub mod calls;
pub mod health;
pub mod queue_items;
pub mod sessions;
pub mod webhooks;
pub mod ws;

pub use calls::configure as configure_calls;
pub use health::health_check;
pub use queue_items::configure as configure_queue_items;
pub use sessions::configure as configure_sessions;
pub use webhooks::configure as configure_webhooks;
pub use ws::ws_handler;
