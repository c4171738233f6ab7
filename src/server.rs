use crate::config::AppConfig;
use crate::dashboard::{Dashboard, RenderPass};
use crate::error::{MapError, TableError};
use crate::filter::{ColumnSelection, SelectionInput};
use crate::html;
use crate::render::{JoinSummary, MapFigure};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct AppState {
    pub dashboard: Dashboard,
}

/// Query half of a render request; the body carries the raw CSV bytes.
#[derive(Deserialize, Default)]
pub struct RenderParams {
    /// JSON object mapping filter column to selected values
    selection: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Serialize, Debug)]
pub struct FilterView {
    column: String,
    options: Vec<String>,
    selected: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct MapView {
    figure: MapFigure,
    summary: JoinSummary,
}

#[derive(Serialize, Debug)]
pub struct RenderResponse {
    total_rows: usize,
    filtered_rows: usize,
    filters: Vec<FilterView>,
    map: Option<MapView>,
    error: Option<ErrorBody>,
}

impl From<&ColumnSelection> for FilterView {
    fn from(selection: &ColumnSelection) -> Self {
        FilterView {
            column: selection.column.clone(),
            options: selection.options.clone(),
            // Keep option order for the client
            selected: selection.options.iter()
                .filter(|o| selection.is_selected(o))
                .cloned()
                .collect(),
        }
    }
}

impl From<&MapError> for ErrorBody {
    fn from(err: &MapError) -> Self {
        ErrorBody { kind: err.kind(), message: err.to_string() }
    }
}

impl From<RenderPass> for RenderResponse {
    fn from(pass: RenderPass) -> Self {
        let filters = pass.selection.columns().iter().map(FilterView::from).collect();
        let (map, error) = match pass.map {
            Ok(rendered) => (Some(MapView { figure: rendered.figure, summary: rendered.summary }), None),
            Err(e) => (None, Some(ErrorBody::from(&e))),
        };
        RenderResponse {
            total_rows: pass.total_rows,
            filtered_rows: pass.filtered.len(),
            filters,
            map,
            error,
        }
    }
}

pub enum ApiError {
    Table(TableError),
    Request { status: StatusCode, message: String },
    Internal(String),
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        ApiError::Request { status: rejection.status(), message: rejection.body_text() }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Request { status: rejection.status(), message: rejection.body_text() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Table(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { kind: e.kind(), message: e.to_string() },
            ),
            ApiError::Request { status, message } => {
                let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "upload_too_large"
                } else {
                    "bad_request"
                };
                (status, ErrorBody { kind, message })
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { kind: "internal", message },
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.dashboard.config().server.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/api/render", post(render_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Geometry resource: {:?}", config.input.geometry);

    let state = Arc::new(AppState {
        dashboard: Dashboard::new(config),
    });
    let app = router(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let page = &state.dashboard.config().page;
    Html(html::index_page(&page.title, &page.subheader))
}

async fn render_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RenderParams>, QueryRejection>,
    upload: Result<Bytes, BytesRejection>,
) -> Result<Json<RenderResponse>, ApiError> {
    let Query(params) = params?;
    let upload = upload?;
    let selection = parse_selection(params.selection.as_deref())?;

    // Parsing and geometry loading block; keep them off the async workers
    let pass = tokio::task::spawn_blocking(move || {
        state.dashboard.render_pass(&upload[..], &selection)
    })
    .await
    .map_err(|e| {
        error!("Render pass panicked: {}", e);
        ApiError::Internal("render pass did not complete".to_string())
    })?
    .map_err(ApiError::Table)?;

    Ok(Json(RenderResponse::from(pass)))
}

fn parse_selection(raw: Option<&str>) -> Result<SelectionInput, ApiError> {
    match raw {
        None => Ok(SelectionInput::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| ApiError::Request {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid selection: {}", e),
        }),
    }
}
