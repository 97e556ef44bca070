mod config;

use crate::storage::{StorageError, Store};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{Method, StatusCode, header},
    routing::{get, post, put},
};
use chorepoints_shared::api::{
    self, ChildDraft, Collection, DeductReq, ErrorBody, MarkDoneReq, RedeemReq, RewardDraft,
    RolloverReq, ServerEvent, SetPinReq, TaskDraft,
};
use chorepoints_shared::{DomainError, ErrorKind};
pub use config::{AppConfig, ConfigError};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;
use uuid::Uuid;

const EVENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    events: broadcast::Sender<ServerEvent>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            store,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelled on shutdown; open event streams end when it fires.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Tell every listener which collections a committed write touched.
    fn notify(&self, collections: &[Collection]) {
        let ev = ServerEvent::Changed {
            collections: collections.to_vec(),
        };
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/config",
            get(|State(s): State<AppState>| async move { list_rows(&s, Collection::Config).await }),
        )
        .route("/api/config/pin", put(api_set_pin))
        .route(
            "/api/children",
            get(|State(s): State<AppState>| async move { list_rows(&s, Collection::Children).await })
                .post(api_add_child),
        )
        .route(
            "/api/children/{id}",
            put(api_update_child).delete(api_delete_child),
        )
        .route("/api/children/{id}/deduct", post(api_deduct))
        .route(
            "/api/tasks",
            get(|State(s): State<AppState>| async move { list_rows(&s, Collection::Tasks).await })
                .post(api_add_task),
        )
        .route("/api/tasks/rollover", post(api_rollover))
        .route(
            "/api/tasks/{id}",
            put(api_update_task).delete(api_delete_task),
        )
        .route("/api/tasks/{id}/done", post(api_mark_done))
        .route("/api/tasks/{id}/approve", post(api_approve))
        .route("/api/tasks/{id}/reject", post(api_reject))
        .route("/api/tasks/{id}/execute", post(api_execute))
        .route(
            "/api/rewards",
            get(|State(s): State<AppState>| async move { list_rows(&s, Collection::Rewards).await })
                .post(api_add_reward),
        )
        .route(
            "/api/rewards/{id}",
            put(api_update_reward).delete(api_delete_reward),
        )
        .route("/api/rewards/{id}/redeem", post(api_redeem))
        .route(
            "/api/redemptions",
            get(|State(s): State<AppState>| async move {
                list_rows(&s, Collection::Redemptions).await
            }),
        )
        .route("/api/redemptions/{id}/fulfill", post(api_fulfill))
        .route(
            "/api/point_history",
            get(|State(s): State<AppState>| async move {
                list_rows(&s, Collection::PointHistory).await
            }),
        )
        .route("/api/events", get(api_events));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .merge(api)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Snapshots must always be fresh
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }

    Ok(resp)
}

async fn list_rows(state: &AppState, collection: Collection) -> Result<AxumResponse, AppError> {
    let store = &state.store;
    Ok(match collection {
        Collection::Config => Json(store.list_config().await?).into_response(),
        Collection::Children => Json(store.list_children().await?).into_response(),
        Collection::Tasks => Json(store.list_tasks().await?).into_response(),
        Collection::Rewards => Json(store.list_rewards().await?).into_response(),
        Collection::Redemptions => Json(store.list_redemptions().await?).into_response(),
        Collection::PointHistory => Json(store.list_point_history().await?).into_response(),
    })
}

async fn api_set_pin(
    State(state): State<AppState>,
    Json(body): Json<SetPinReq>,
) -> Result<Json<api::ConfigRow>, AppError> {
    let row = state.store.set_pin(&body.pin).await?;
    tracing::info!("parent PIN updated");
    state.notify(&[Collection::Config]);
    Ok(Json(row))
}

async fn api_add_child(
    State(state): State<AppState>,
    Json(body): Json<ChildDraft>,
) -> Result<(StatusCode, Json<api::ChildRow>), AppError> {
    let row = state.store.add_child(&body).await?;
    tracing::info!(child_id = %row.id, name = %row.name, "child added");
    state.notify(&[Collection::Children]);
    Ok((StatusCode::CREATED, Json(row)))
}

async fn api_update_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChildDraft>,
) -> Result<Json<api::ChildRow>, AppError> {
    let row = state.store.update_child(&id, &body).await?;
    state.notify(&[Collection::Children]);
    Ok(Json(row))
}

async fn api_delete_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_child(&id).await?;
    tracing::info!(child_id = %id, "child removed");
    state.notify(&[Collection::Children]);
    Ok(StatusCode::NO_CONTENT)
}

async fn api_deduct(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DeductReq>,
) -> Result<Json<api::PointsChangeResp>, AppError> {
    let today = state.config.today();
    let resp = state
        .store
        .deduct(&id, body.amount, &body.reason, today)
        .await?;
    state.notify(&[Collection::Children, Collection::PointHistory]);
    Ok(Json(resp))
}

async fn api_add_task(
    State(state): State<AppState>,
    Json(body): Json<TaskDraft>,
) -> Result<(StatusCode, Json<api::TaskRow>), AppError> {
    let row = state.store.add_task(&body, chrono::Utc::now()).await?;
    state.notify(&[Collection::Tasks]);
    Ok((StatusCode::CREATED, Json(row)))
}

async fn api_update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TaskDraft>,
) -> Result<Json<api::TaskRow>, AppError> {
    let row = state.store.update_task(&id, &body).await?;
    state.notify(&[Collection::Tasks]);
    Ok(Json(row))
}

async fn api_delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_task(&id).await?;
    state.notify(&[Collection::Tasks]);
    Ok(StatusCode::NO_CONTENT)
}

async fn api_mark_done(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MarkDoneReq>,
) -> Result<Json<api::TaskChangeResp>, AppError> {
    let today = state.config.today();
    let resp = state.store.mark_done(&id, body.photo, today).await?;
    state.notify(&[Collection::Tasks]);
    Ok(Json(resp))
}

async fn api_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::TaskChangeResp>, AppError> {
    let today = state.config.today();
    let resp = state.store.approve(&id, today).await?;
    state.notify(&[
        Collection::Tasks,
        Collection::Children,
        Collection::PointHistory,
    ]);
    Ok(Json(resp))
}

async fn api_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::TaskChangeResp>, AppError> {
    let resp = state.store.reject(&id).await?;
    state.notify(&[Collection::Tasks]);
    Ok(Json(resp))
}

async fn api_execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::TaskChangeResp>, AppError> {
    let today = state.config.today();
    let resp = state.store.execute_penalty(&id, today).await?;
    state.notify(&[Collection::Children, Collection::PointHistory]);
    Ok(Json(resp))
}

async fn api_rollover(
    State(state): State<AppState>,
    Json(body): Json<RolloverReq>,
) -> Result<Json<api::RolloverResp>, AppError> {
    let reference_date = body.reference_date.unwrap_or_else(|| state.config.today());
    let changed = state.store.rollover(reference_date).await?;
    if !changed.is_empty() {
        state.notify(&[Collection::Tasks]);
    }
    Ok(Json(api::RolloverResp {
        reference_date,
        changed: changed.into_iter().map(|id| id.0).collect(),
    }))
}

async fn api_add_reward(
    State(state): State<AppState>,
    Json(body): Json<RewardDraft>,
) -> Result<(StatusCode, Json<api::RewardRow>), AppError> {
    let row = state.store.add_reward(&body).await?;
    state.notify(&[Collection::Rewards]);
    Ok((StatusCode::CREATED, Json(row)))
}

async fn api_update_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RewardDraft>,
) -> Result<Json<api::RewardRow>, AppError> {
    let row = state.store.update_reward(&id, &body).await?;
    state.notify(&[Collection::Rewards]);
    Ok(Json(row))
}

async fn api_delete_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_reward(&id).await?;
    state.notify(&[Collection::Rewards]);
    Ok(StatusCode::NO_CONTENT)
}

async fn api_redeem(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RedeemReq>,
) -> Result<Json<api::RedeemResp>, AppError> {
    let today = state.config.today();
    let resp = state.store.redeem(&id, &body.child_id, today).await?;
    state.notify(&[
        Collection::Children,
        Collection::Redemptions,
        Collection::PointHistory,
    ]);
    Ok(Json(resp))
}

async fn api_fulfill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::RedemptionRow>, AppError> {
    let row = state.store.fulfill(&id).await?;
    state.notify(&[Collection::Redemptions]);
    Ok(Json(row))
}

/// Change feed. Each message names the collections a write touched; clients
/// refetch those. A listener that fell behind is told to refetch everything.
async fn api_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe())
        .filter_map(|msg| async move {
            Event::default().json_data(feed_event(msg)).ok().map(Ok)
        })
        .take_until(state.shutdown.clone().cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn feed_event(msg: Result<ServerEvent, BroadcastStreamRecvError>) -> ServerEvent {
    match msg {
        Ok(ev) => ev,
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "event listener lagged");
            ServerEvent::Changed {
                collections: Collection::ALL.to_vec(),
            }
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Domain(DomainError),
    Internal(String),
}

impl AppError {
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Domain(d) => AppError::Domain(d),
            other => AppError::internal(other),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::SyncFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> AxumResponse {
        let (status, msg, kind, detail) = match self {
            AppError::Domain(e) => {
                let kind = e.kind();
                (status_for(kind), e.to_string(), Some(kind), None)
            }
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
                None,
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = ?kind, message = %msg, "request refused");
        }
        (status, Json(ErrorBody { error: msg, kind })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lagged_listener_is_told_to_refetch_everything() {
        let ev = feed_event(Err(BroadcastStreamRecvError::Lagged(3)));
        assert_eq!(
            ev,
            ServerEvent::Changed {
                collections: Collection::ALL.to_vec(),
            }
        );
        let children = ServerEvent::Changed {
            collections: vec![Collection::Children],
        };
        assert_eq!(feed_event(Ok(children.clone())), children);
    }
}
