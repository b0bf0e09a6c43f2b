//!
//! acl-proxy HTTP server
//! ---------------------
//! Axum routes mapping 1:1 onto `ConfigStore` operations.
//!
//! Routes:
//! - `GET /healthz`
//! - `GET /v1/auth/idents`, `GET|PUT|DELETE /v1/auth/idents/{name}`
//! - `GET /v1/auth/perms`, `GET|PUT|DELETE /v1/auth/perms/{name}`
//! - `GET|POST /v1/auth/snapshot[?name=]`, `GET /v1/auth/snapshot/{name}`
//! - `GET|POST /v1/auth/publish[?name=]`
//!
//! Store calls do blocking file I/O and run on `spawn_blocking`; a graceful shutdown
//! waits for in-flight requests, so a rename in progress is never abandoned.
//! Errors are returned as `{"code", "message"}` with the status from `ConfError::http_status`.

use std::future::Future;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Options;
use crate::credential::policy_by_name;
use crate::error::{ConfError, ConfResult};
use crate::model::{Identity, SnapshotState, SubjectRules};
use crate::publisher::{CommandNotifier, NoopNotifier, Notifier};
use crate::store::{ConfigStore, SharedConfigStore};

pub const APP_NAME: &str = "acl-proxy";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedConfigStore,
}

#[derive(Debug)]
pub enum ApiError {
    Conf(ConfError),
    Internal(String),
}

impl From<ConfError> for ApiError {
    fn from(e: ConfError) -> Self { ApiError::Conf(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Conf(e) => {
                let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                debug!(target: "acl_proxy::http", "request failed: {}", e);
                (status, Json(json!({ "code": e.code_str(), "message": e.to_string() }))).into_response()
            }
            ApiError::Internal(msg) => {
                error!(target: "acl_proxy::http", "internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "internal", "message": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&ConfigStore) -> ConfResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(store.0.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::Conf(ConfError::validation("body", e.to_string())))
}

// ---- Identities ----

#[derive(Debug, Deserialize)]
pub struct IdentityPayload {
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

/// Identity as returned over HTTP. The credential is never echoed back.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl From<Identity> for IdentityView {
    fn from(i: Identity) -> Self {
        IdentityView { username: i.name, permissions: i.permission_ref, account: i.account_ref }
    }
}

async fn list_idents(State(state): State<AppState>) -> ApiResult<Json<Vec<IdentityView>>> {
    let idents = blocking(&state, |s| Ok(s.list_identities())).await?;
    Ok(Json(idents.into_iter().map(IdentityView::from).collect()))
}

async fn get_ident(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<IdentityView>> {
    let ident = blocking(&state, move |s| s.get_identity(&name)).await?;
    Ok(Json(ident.into()))
}

async fn put_ident(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> ApiResult<Json<IdentityView>> {
    let payload: IdentityPayload = parse_body(&body)?;
    if let Some(u) = &payload.username {
        if u != &name {
            return Err(ConfError::validation("username", format!("'{}' does not match path '{}'", u, name)).into());
        }
    }
    let ident = blocking(&state, move |s| {
        s.upsert_identity(&name, &payload.password, payload.permissions, payload.account)
    })
    .await?;
    Ok(Json(ident.into()))
}

async fn delete_ident(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    blocking(&state, move |s| s.delete_identity(&name)).await?;
    Ok(StatusCode::OK)
}

// ---- Permission templates ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionPayload {
    #[serde(default)]
    pub publish: SubjectRules,
    #[serde(default)]
    pub subscribe: SubjectRules,
}

async fn list_perms(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let perms = blocking(&state, |s| Ok(s.list_permissions())).await?;
    Ok(Json(perms))
}

async fn get_perm(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let perm = blocking(&state, move |s| s.get_permission(&name)).await?;
    Ok(Json(perm))
}

async fn put_perm(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let payload: PermissionPayload = parse_body(&body)?;
    let perm = blocking(&state, move |s| s.upsert_permission(&name, payload.publish, payload.subscribe)).await?;
    Ok(Json(perm))
}

async fn delete_perm(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    blocking(&state, move |s| s.delete_permission(&name)).await?;
    Ok(StatusCode::OK)
}

// ---- Snapshots and publish ----

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

impl NameQuery {
    fn require(self) -> ApiResult<String> {
        self.name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConfError::validation("name", "query parameter 'name' is required").into())
    }
}

async fn list_snapshots(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let snaps = blocking(&state, |s| s.list_snapshots()).await?;
    Ok(Json(snaps))
}

async fn get_snapshot(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Response> {
    let bytes = blocking(&state, move |s| s.snapshot_bytes(&name)).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn create_snapshot(State(state): State<AppState>, Query(q): Query<NameQuery>) -> ApiResult<impl IntoResponse> {
    let name = q.require()?;
    let info = blocking(&state, move |s| s.create_snapshot(&name)).await?;
    Ok(Json(info))
}

#[derive(Debug, Serialize)]
struct CurrentView {
    current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<SnapshotState>,
}

async fn current(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let view = blocking(&state, |s| {
        let current = s.current_name();
        let st = match &current {
            Some(n) => Some(s.snapshot_state(n)?),
            None => None,
        };
        Ok(CurrentView { current, state: st })
    })
    .await?;
    Ok(Json(view))
}

async fn publish(State(state): State<AppState>, Query(q): Query<NameQuery>) -> ApiResult<impl IntoResponse> {
    let name = q.require()?;
    let outcome = blocking(&state, move |s| s.publish(&name)).await?;
    Ok(Json(json!({
        "published": outcome.name,
        "published_at": outcome.published_at,
        "warning": outcome.warning.map(|w| w.to_string()),
    })))
}

pub fn router(store: SharedConfigStore) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/v1/auth/idents", get(list_idents))
        .route("/v1/auth/idents/{name}", get(get_ident).put(put_ident).delete(delete_ident))
        .route("/v1/auth/perms", get(list_perms))
        .route("/v1/auth/perms/{name}", get(get_perm).put(put_perm).delete(delete_perm))
        .route("/v1/auth/snapshot", get(list_snapshots).post(create_snapshot))
        .route("/v1/auth/snapshot/{name}", get(get_snapshot))
        .route("/v1/auth/publish", get(current).post(publish))
        .with_state(AppState { store })
}

/// Build the store described by `opts`.
pub fn open_store(opts: &Options) -> anyhow::Result<SharedConfigStore> {
    let credentials = policy_by_name(&opts.credentials)
        .ok_or_else(|| anyhow::anyhow!("unknown credential scheme '{}'", opts.credentials))?;
    let notifier: Box<dyn Notifier> = match &opts.publish_script {
        Some(script) => Box::new(CommandNotifier::new(script)),
        None => Box::new(NoopNotifier),
    };
    let store = ConfigStore::open_with(&opts.data_dir, credentials, notifier)
        .map_err(|e| anyhow::anyhow!("opening data directory {}: {}", opts.data_dir.display(), e))?;
    Ok(SharedConfigStore::new(store))
}

/// Serve on an already bound listener until `shutdown` resolves, then drain.
pub async fn serve<F>(listener: TcpListener, store: SharedConfigStore, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(target: "acl_proxy::http", "listening on {}", listener.local_addr()?);
    axum::serve(listener, router(store)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("trapped SIGINT"),
        _ = terminate => debug!("trapped SIGTERM"),
    }
}

/// Start the server described by `opts` and run until a shutdown signal.
pub async fn run(opts: Options) -> anyhow::Result<()> {
    info!("Starting {} v{}", APP_NAME, VERSION);
    info!(
        target: "acl_proxy::http",
        "data_dir={} publish_script={:?} credentials={}",
        opts.data_dir.display(), opts.publish_script, opts.credentials
    );
    let store = open_store(&opts)?;
    if let Some(live) = store.current_name() {
        info!("live snapshot: '{}'", live);
    }
    let listener = TcpListener::bind(opts.listen_addr()?).await?;
    if opts.no_signals {
        serve(listener, store, std::future::pending()).await?;
    } else {
        serve(listener, store, shutdown_signal()).await?;
    }
    info!("Bye...");
    Ok(())
}
