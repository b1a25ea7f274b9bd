//! Prospect dialer server
//!
//! Call-control engine behind the CRM: power-dial sessions, click-to-call
//! bridges through the operator's cell, and the telephony webhook stream.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use dialer_api::{configure_api, configure_public};
use dialer_auth::JwtService;
use dialer_core::AppConfig;
use dialer_db::{create_pool, pg_repositories, run_migrations};
use dialer_services::Dialer;
use dialer_telephony::CallControlClient;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "prospect_dialer={lvl},dialer_api={lvl},dialer_services={lvl},dialer_telephony={lvl},dialer_db={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting prospect dialer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let telephony = Arc::new(
        CallControlClient::new(&config.telephony)
            .context("failed to build telephony client")?,
    );
    let dialer = web::Data::new(Dialer::new(
        pg_repositories(pool),
        telephony,
        config.dialer.clone(),
    ));
    let _workers = dialer
        .start_background()
        .await
        .context("failed to start background workers")?;

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    let cors_origins = config.server.cors_origins.clone();
    HttpServer::new(move || {
        let origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|o| origins.split(',').any(|allowed| allowed.trim() == o))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::COOKIE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(dialer.clone())
            .app_data(web::Data::new(jwt_service.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .service(web::scope("/api/v1").configure(configure_api))
            .configure(configure_public)
    })
    .workers(config.server.workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
