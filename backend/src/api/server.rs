//! HTTP server for the xmlgate API.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                               |
//! |--------|--------------------|-------------------------------------------|
//! | GET    | `/health`          | Health check                              |
//! | GET    | `/version`         | Release info from version.json            |
//! | GET    | `/api/logs`        | SSE stream of request logs                |
//! | GET    | `/downloads/*`     | Files written with `viaUrl: true`         |
//! | POST   | `/api/extract`     | XPath value extraction (xmlstarlet)       |
//! | POST   | `/extract`         | Same as `/api/extract`                    |
//! | POST   | `/api/validate`    | Schema / well-formedness validation       |
//! | POST   | `/api/transform`   | XSLT transformation (xsltproc)            |
//! | POST   | `/api/format`      | Pretty-print XML or JSON                  |
//! | POST   | `/api/strip-dtd`   | Drop the external subset (xmllint)        |
//! | POST   | `/api/convert`     | XML <-> JSON conversion                   |
//! | POST   | `/api/repair`      | Repair malformed JSON (jsonrepair)        |
//!
//! Only the `POST` operations pass through the usage gate.

use axum::{
    extract::State,
    http::{header, HeaderName, Method},
    middleware,
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::handlers;
use super::logs::LOG_BROADCASTER;
use crate::config::Config;
use crate::gate::{gate_middleware, UsageGate, API_KEY_HEADER};
use crate::tools::ToolRunner;
use crate::version::VersionFile;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tools: ToolRunner,
    pub gate: Arc<UsageGate>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let tools = ToolRunner::from_config(&config);
        let gate = Arc::new(UsageGate::from_config(&config));
        Self {
            config: Arc::new(config),
            tools,
            gate,
        }
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, HeaderName::from_static(API_KEY_HEADER)])
        .expose_headers([header::CONTENT_TYPE]);

    let operations = Router::new()
        .route("/extract", post(handlers::extract))
        .route("/api/extract", post(handlers::extract))
        .route("/api/validate", post(handlers::validate))
        .route("/api/transform", post(handlers::transform))
        .route("/api/format", post(handlers::format))
        .route("/api/strip-dtd", post(handlers::strip_dtd))
        .route("/api/convert", post(handlers::convert))
        .route("/api/repair", post(handlers::repair))
        .route_layer(middleware::from_fn_with_state(state.gate.clone(), gate_middleware));

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/api/logs", get(sse_logs))
        .merge(operations)
        .nest_service("/downloads", ServeDir::new(&state.config.public_dir))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let state = AppState::new(config);

    println!("🚀 xmlgate running on http://localhost:{}", port);
    println!("   Data root:   {}", state.config.data_root.display());
    println!("   Downloads:   {} -> {}", state.config.public_dir.display(), state.config.public_url);
    println!("   Free limit:  {} requests per client", state.config.free_limit);
    println!("   API keys:    {}", state.config.api_keys.len());
    println!();

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "xmlgate",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "extract": "POST /api/extract",
            "validate": "POST /api/validate",
            "transform": "POST /api/transform",
            "format": "POST /api/format",
            "stripDtd": "POST /api/strip-dtd",
            "convert": "POST /api/convert",
            "repair": "POST /api/repair",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// Release info, falling back to the crate version
async fn version(State(state): State<AppState>) -> Json<VersionFile> {
    let mut data = match tokio::fs::read_to_string(&state.config.version_file).await {
        Ok(content) => VersionFile::parse_or_default(&content),
        Err(_) => VersionFile::default(),
    };
    if data.version.is_empty() {
        data.version = env!("CARGO_PKG_VERSION").to_string();
    }
    Json(data)
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
