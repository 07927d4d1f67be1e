use crate::{
    app::{App, AppError},
    items::{Item, ItemCreate},
    semantic::MatchResult,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

pub fn router(app: Arc<App>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/items", post(create))
        .route("/items/:id", get(read_item))
        .route("/matches/:id", get(matches))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => log::error!("failed to install signal handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(app: Arc<App>) -> anyhow::Result<()> {
    let addr = app.config().listen_addr.clone();
    let router = router(app);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(app: App) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(Arc::new(app)))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => axum::http::StatusCode::BAD_REQUEST,
            AppError::ModelUnavailable(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Semantic(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn create(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ItemCreate>,
) -> Result<Json<Item>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    // embedding is CPU bound, keep it off the async workers
    tokio::task::block_in_place(move || app.create_item(payload))
        .map(Json)
        .map_err(Into::into)
}

async fn read_item(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, HttpError> {
    Ok(Json(state.app.get_item(id)?))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchesQuery {
    pub top_k: Option<i64>,
}

async fn matches(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
    Query(query): Query<MatchesQuery>,
) -> Result<Json<Vec<MatchResult>>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.ensure_embedding(id)?;
        app.find_matches(id, query.top_k)
    })
    .map(Json)
    .map_err(Into::into)
}
