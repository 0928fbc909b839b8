mod config;

use std::sync::Arc;

use axum::{Router, routing::get};
use axum::http::{Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use quill_api::{AppStateInner, TokenService};
use quill_db::Database;
use quill_moderation::{
    Classifier, GeminiClassifier, KeywordClassifier, ModerationWorker, queue,
};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Moderation pipeline
    let classifier: Arc<dyn Classifier> = match &config.gemini_api_key {
        Some(key) => {
            info!("Moderating with Gemini model {}", config.gemini_model);
            Arc::new(GeminiClassifier::new(key.clone(), config.gemini_model.clone()))
        }
        None => {
            let keywords = KeywordClassifier::new(&config.blocked_words);
            if keywords.is_empty() {
                warn!("No QUILL_GEMINI_API_KEY and an empty blocklist; nothing will be suppressed");
            } else {
                info!("Moderating with a {}-word blocklist", config.blocked_words.len());
            }
            Arc::new(keywords)
        }
    };

    let (job_queue, jobs) = queue::channel(config.queue_capacity);
    let state = AppStateInner::new(
        db.clone(),
        TokenService::new(&config.token_config()),
        Arc::new(job_queue),
    );

    let worker = Arc::new(ModerationWorker::new(
        classifier,
        Arc::new(state.posts.clone()),
        Arc::new(state.comments.clone()),
        Arc::new(state.comments.clone()),
    ));
    let workers = worker.spawn_pool(jobs, config.workers);
    info!("Started {} moderation workers", workers.len());

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health))
        .merge(quill_api::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Quill server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue handle; workers finish the backlog and exit.
    info!("Draining moderation queue...");
    for handle in workers {
        if let Err(e) = handle.await {
            warn!("Moderation worker ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete");

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
