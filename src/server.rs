//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, user and document counts, version |
//! | `GET`  | `/user/{id}` | A user and their allowed categories |
//! | `GET`  | `/users` | All users |
//! | `GET`  | `/categories` | Roles and the categories they grant |
//! | `GET`  | `/index-info` | Size, dimensions and categories of the served index |
//! | `POST` | `/search` | Search with an explicit or default threshold |
//! | `POST` | `/smart-search` | Search with threshold 0.05 |
//! | `POST` | `/strict-search` | Search with threshold 0.3 |
//! | `POST` | `/chat` | Reply quoting the best match |
//! | `POST` | `/admin/reindex` | Rebuild the index from the corpus and swap it in |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "user not found: user042" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `timeout` (408), `rate_limited` (429), `internal` (500). A 429 error also
//! carries `limit` and `remaining_requests`.
//!
//! # Logging
//!
//! Every request emits a `request served` event (method, path, status,
//! `elapsed_ms`). Search and chat add their own events with the user and
//! result counts.
//!
//! # Authentication
//!
//! With `[server].api_keys` set, every route but `/health` requires a
//! matching `X-API-Key` header.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rolesearch_core::{SearchMode, SearchOutcome, UserPermissionView, VectorIndex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::auth::{verify_api_key, API_KEY_HEADER};
use crate::chat::{excerpt, format_chat_reply, ChatReply, ChatRequest};
use crate::config::Config;
use crate::index_store::{build_index, load_index, IndexHandle};
use crate::migrate::run_migrations;
use crate::rate_limit::RateLimiter;
use crate::search::{execute, resolve_user, SearchRequest, SearchResponse};
use crate::users::{User, UserStore};

/// Results requested by `/chat`.
const CHAT_TOP_K: usize = 3;

/// Characters of the chat message kept in the log.
const CHAT_LOG_PREVIEW_CHARS: usize = 100;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: UserStore,
    index: IndexHandle,
    limiter: Arc<RateLimiter>,
    reindex: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, store: UserStore, index: IndexHandle) -> Self {
        let limiter = RateLimiter::per_minute(config.rate_limit.requests_per_minute);
        Self {
            config: Arc::new(config),
            store,
            index,
            limiter: Arc::new(limiter),
            reindex: Arc::new(Mutex::new(())),
        }
    }
}

/// `rolesearch serve`: load the index, open the database and serve until
/// Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = UserStore::open(config).await?;
    run_migrations(store.pool()).await?;

    let index = IndexHandle::new(load_index(config));
    let state = AppState::new(config.clone(), store.clone(), index);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "server listening");
    println!("Listening on http://{}", listener.local_addr()?);

    serve(listener, state).await?;
    store.close().await;
    Ok(())
}

/// Serve `state` on an already-bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let limiter = Arc::clone(&state.limiter);
    let sweeper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            limiter.sweep();
        }
    });

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    result?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// All routes, with CORS and the API-key check applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/user/{id}", get(handle_get_user))
        .route("/users", get(handle_list_users))
        .route("/categories", get(handle_categories))
        .route("/index-info", get(handle_index_info))
        .route("/search", post(handle_search))
        .route("/smart-search", post(handle_smart_search))
        .route("/strict-search", post(handle_strict_search))
        .route("/chat", post(handle_chat))
        .route("/admin/reindex", post(handle_reindex))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(cors)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(flatten)]
    quota: Option<Quota>,
}

/// Rate-limit state reported with 429 responses.
#[derive(Debug, Serialize)]
struct Quota {
    limit: usize,
    remaining_requests: usize,
}

/// Error type that converts into a JSON HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    quota: Option<Quota>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                quota: self.quota,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            quota: None,
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn rate_limited(limit: usize, remaining_requests: usize) -> AppError {
    let mut err = AppError::new(
        StatusCode::TOO_MANY_REQUESTS,
        "rate_limited",
        format!(
            "Too many requests. Limit is {} per minute; try again in a minute.",
            limit
        ),
    );
    err.quota = Some(Quota {
        limit,
        remaining_requests,
    });
    err
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

// ============ Middleware ============

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_api_key(provided, &state.config.server.api_keys)
        .map_err(|e| unauthorized(e.to_string()))?;
    Ok(next.run(request).await)
}

/// Access log: one event per request with status and latency.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(%method, %path, status, elapsed_ms, "request failed");
    } else {
        info!(%method, %path, status, elapsed_ms, "request served");
    }
    response
}

fn check_rate_limit(state: &AppState, user_id: &str) -> Result<(), AppError> {
    if state.limiter.check(user_id) {
        Ok(())
    } else {
        Err(rate_limited(
            state.limiter.limit(),
            state.limiter.remaining(user_id),
        ))
    }
}

/// Search `index` on the blocking pool, bounded by the request timeout.
async fn search_with_timeout(
    state: &AppState,
    user: Option<UserPermissionView>,
    query: String,
    top_k: usize,
    threshold: f32,
) -> Result<SearchOutcome, AppError> {
    let index: Arc<VectorIndex> = state.index.snapshot();
    let options = state.config.similarity_options();
    let limit = Duration::from_secs(state.config.server.request_timeout_secs);

    let task = tokio::task::spawn_blocking(move || {
        execute(index, user.as_ref(), &query, top_k, threshold, options)
    });

    match tokio::time::timeout(limit, task).await {
        Err(_) => Err(timeout_error(format!(
            "search timed out after {}s",
            limit.as_secs()
        ))),
        Ok(Err(join)) => Err(internal(format!("search task failed: {}", join))),
        Ok(Ok(Err(e))) => Err(bad_request(e.to_string())),
        Ok(Ok(Ok(outcome))) => Ok(outcome),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    total_users: usize,
    total_documents: usize,
    vector_dim: usize,
    vocab_size: usize,
    version: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.index.snapshot();
    let (status, total_users) = match state.store.count_users().await {
        Ok(n) => ("ok", n),
        Err(e) => {
            error!(error = %e, "health check could not read users");
            ("degraded", 0)
        }
    };
    Json(HealthResponse {
        status,
        total_users,
        total_documents: index.size(),
        vector_dim: index.vector_dim(),
        vocab_size: index.vocab_size(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Users and roles ============

#[derive(Serialize)]
struct UserInfoResponse {
    user_id: String,
    username: String,
    email: String,
    role: String,
    department: String,
    allowed_categories: Vec<String>,
}

async fn handle_get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserInfoResponse>, AppError> {
    let user = state.store.get_user(&id).await?;
    let view = state.store.permission_view(&id).await?;
    let (Some(user), Some(view)) = (user, view) else {
        return Err(not_found(format!("user not found: {}", id)));
    };
    Ok(Json(UserInfoResponse {
        user_id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        department: user.department,
        allowed_categories: view.allowed_categories.into_iter().collect(),
    }))
}

#[derive(Serialize)]
struct UserListResponse {
    total_users: usize,
    users: Vec<User>,
}

async fn handle_list_users(
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>, AppError> {
    let users = state.store.list_users().await?;
    Ok(Json(UserListResponse {
        total_users: users.len(),
        users,
    }))
}

#[derive(Serialize)]
struct RoleInfo {
    description: String,
    allowed_categories: Vec<String>,
    category_count: usize,
}

#[derive(Serialize)]
struct CategoriesResponse {
    roles: BTreeMap<String, RoleInfo>,
    total_roles: usize,
}

async fn handle_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoriesResponse>, AppError> {
    let roles: BTreeMap<String, RoleInfo> = state
        .store
        .list_roles()
        .await?
        .into_iter()
        .map(|r| {
            let info = RoleInfo {
                description: r.description,
                category_count: r.allowed_categories.len(),
                allowed_categories: r.allowed_categories.into_iter().collect(),
            };
            (r.role, info)
        })
        .collect();
    Ok(Json(CategoriesResponse {
        total_roles: roles.len(),
        roles,
    }))
}

// ============ GET /index-info ============

#[derive(Serialize)]
struct IndexInfoResponse {
    total_documents: usize,
    vector_dim: usize,
    vocab_size: usize,
    vocabulary_terms: usize,
    categories: Vec<String>,
}

async fn handle_index_info(State(state): State<AppState>) -> Json<IndexInfoResponse> {
    let index = state.index.snapshot();
    Json(IndexInfoResponse {
        total_documents: index.size(),
        vector_dim: index.vector_dim(),
        vocab_size: index.vocab_size(),
        vocabulary_terms: index.vocabulary().len(),
        categories: index.categories().into_iter().map(String::from).collect(),
    })
}

// ============ Search ============

async fn run_search_request(
    state: AppState,
    request: SearchRequest,
    mode: Option<SearchMode>,
) -> Result<Json<SearchResponse>, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    check_rate_limit(&state, &request.user_id)?;
    let started = Instant::now();

    let threshold = match mode {
        Some(mode) => mode.threshold(),
        None => request
            .similarity_threshold
            .unwrap_or_else(|| SearchMode::Standard.threshold()),
    };
    let top_k = request
        .top_k
        .unwrap_or(state.config.retrieval.default_top_k);

    let user = resolve_user(
        &state.store,
        state.config.server.fallback_role.as_deref(),
        &request.user_id,
        request.user_info,
    )
    .await?
    .ok_or_else(|| not_found(format!("user not found: {}", request.user_id)))?;

    let outcome =
        search_with_timeout(&state, Some(user.clone()), request.query.clone(), top_k, threshold)
            .await?;
    info!(
        user = %user.user_id,
        role = %user.role,
        threshold,
        total_found = outcome.total_found,
        returned = outcome.results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search"
    );
    Ok(Json(SearchResponse::from_outcome(
        &user,
        &request.query,
        outcome,
    )))
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search_request(state, request, None).await
}

async fn handle_smart_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search_request(state, request, Some(SearchMode::Smart)).await
}

async fn handle_strict_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search_request(state, request, Some(SearchMode::Strict)).await
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    check_rate_limit(&state, &request.user_id)?;
    let started = Instant::now();

    let user = resolve_user(
        &state.store,
        state.config.server.fallback_role.as_deref(),
        &request.user_id,
        None,
    )
    .await?;

    let message_preview = excerpt(&request.message, CHAT_LOG_PREVIEW_CHARS);
    let outcome = search_with_timeout(
        &state,
        user,
        request.message,
        CHAT_TOP_K,
        SearchMode::Standard.threshold(),
    )
    .await?;
    let reply = format_chat_reply(&outcome);
    info!(
        user = %request.user_id,
        query = %message_preview,
        success = reply.success,
        results = reply.total_results,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chat reply"
    );
    Ok(Json(reply))
}

// ============ POST /admin/reindex ============

#[derive(Serialize)]
struct ReindexResponse {
    status: &'static str,
    total_documents: usize,
    vocabulary_terms: usize,
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, AppError> {
    // One rebuild at a time; later requests wait and rebuild again.
    let _rebuilding = state.reindex.lock().await;
    let config = Arc::clone(&state.config);
    let index = tokio::task::spawn_blocking(move || build_index(&config))
        .await
        .map_err(|e| internal(format!("reindex task failed: {}", e)))??;

    let response = ReindexResponse {
        status: "ok",
        total_documents: index.size(),
        vocabulary_terms: index.vocabulary().len(),
    };
    state.index.publish(Arc::new(index));
    Ok(Json(response))
}
