use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::json;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::catalog::{CatalogGateway, CatalogQuery, Outcome};
use crate::cli::ServeArgs;
use crate::clock;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CatalogGateway>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/books", get(search_books))
        .route("/api/books/html/:id", get(get_book_html))
        .route("/api/books/:id", get(get_book))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let upstream_url = Url::parse(&args.upstream_url).context("parse --upstream-url")?;
    let upstream = UpstreamClient::new(upstream_url)?;
    let gateway = CatalogGateway::new(upstream, clock::system()).context("build catalog gateway")?;
    let app = router(AppState {
        gateway: Arc::new(gateway),
    });

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("bind {}", args.addr))?;
    tracing::info!(addr = %args.addr, upstream = %args.upstream_url, "serving catalog gateway");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Response {
    match state.gateway.search(&query).await {
        Outcome::Success(page) => cacheable_json(page),
        other => failure_response(&other),
    }
}

async fn get_book(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.gateway.get_by_id(id).await {
        Outcome::Success(record) => match serde_json::to_value(&record) {
            Ok(value) => cacheable_json(value),
            Err(err) => {
                tracing::error!(id, ?err, "serialize book record");
                error_response(StatusCode::BAD_GATEWAY, "Upstream fetch failed")
            }
        },
        other => failure_response(&other),
    }
}

async fn get_book_html(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.gateway.get_content_body(id).await {
        Outcome::Success(body) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )],
            body,
        )
            .into_response(),
        other => failure_response(&other),
    }
}

/// Timeouts surface as 504 so callers can offer a retry; any other
/// upstream failure is a generic 502; absence is a plain 404.
fn failure_response<T>(outcome: &Outcome<T>) -> Response {
    match outcome {
        Outcome::Success(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        Outcome::NotFound => error_response(StatusCode::NOT_FOUND, "Book not found"),
        Outcome::TimedOut => error_response(StatusCode::GATEWAY_TIMEOUT, "Upstream timed out"),
        Outcome::UpstreamError(_) => error_response(StatusCode::BAD_GATEWAY, "Upstream fetch failed"),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn cacheable_json(payload: serde_json::Value) -> Response {
    (
        [(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=60"),
        )],
        Json(payload),
    )
        .into_response()
}
