use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod admin;
mod auth;
mod error;
mod models;
mod moderation;
mod openapi;
mod quota;
mod reclaimer;
mod repo;
mod routes;
mod security;
mod storage;

use moderation::ModerationEngine;
use openapi::ApiDoc;
use quota::PostQuota;
use reclaimer::ExpiryReclaimer;
#[cfg(feature = "inmem-store")]
use repo::inmem::InMemRepo;
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use storage::build_image_store;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!("prometheus exporter not started: {e}");
    }

    info!("Bootstrapping bozor server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        crate::repo::pg::PgRepo::new(pool)
    };

    let repo: Arc<dyn repo::Repo> = Arc::new(repo);
    let image_store = build_image_store().await;
    let engine = Arc::new(ModerationEngine::new(repo.clone()));
    let quota = PostQuota::from_env();

    // Background reclamation runs under a service identity with its own
    // store handles; it is not a request handler and takes no caller input.
    let interval_secs = std::env::var("RECLAIM_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600u64);
    let reclaimer = Arc::new(ExpiryReclaimer::new(repo.clone(), image_store.clone()));
    let _sweeper = reclaimer.spawn(std::time::Duration::from_secs(interval_secs));
    info!("Expiry reclaimer scheduled every {interval_secs}s");

    let openapi = ApiDoc::openapi();
    let state = AppState {
        repo: repo.clone(),
        image_store: image_store.clone(),
        engine: engine.clone(),
        quota: quota.clone(),
    };

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET", "S3_ENDPOINT"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
}
