//! Tally Web Server
//!
//! Axum-based REST API for the Tally statement tracker.
//!
//! Security features:
//! - Identity header or API key authentication (secure by default, use --no-auth for local dev)
//! - Per-user scoping of statements, transactions, and drafts
//! - Same-origin CORS unless origins are configured
//! - Input validation (upload size limits, period bounds)
//! - Internal errors logged, never echoed to clients

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::ai::{AIBackend, AIClient};
use tally_core::db::Database;
use tally_core::enrich::Enricher;
use tally_core::pipeline::StatementProcessor;
use tally_core::storage::FileStore;

mod drafts;
mod events;
mod handlers;

pub use drafts::DraftDebouncer;

/// Largest accepted statement upload (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum JSON body size for non-upload endpoints
pub const MAX_JSON_BODY: usize = 2 * 1024 * 1024;

/// Identity header set by the authenticating proxy in front of the server
const AUTH_USER_HEADER: &str = "x-auth-user-email";

/// Header with which an API key caller acts for a user
const ACT_AS_USER_HEADER: &str = "x-tally-user";

/// Header carrying `Bearer <api key>`
const AUTHORIZATION_HEADER: &str = "authorization";

/// User for unauthenticated local development
pub const LOCAL_DEV_USER: &str = "local-dev";

/// Returned when an LLM endpoint is called without a configured backend
pub const AI_NOT_CONFIGURED: &str = "GEMINI_API_KEY is not set";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Reject requests without an identity (on unless `--no-auth`)
    pub require_auth: bool,
    /// Origins allowed by CORS; empty means same-origin only
    pub allowed_origins: Vec<String>,
    /// API keys for service callers (receipt scanners, scripts), sent as `Bearer <key>`
    pub api_keys: Vec<String>,
    /// Directory for uploaded statement files
    pub storage_dir: PathBuf,
    /// Quiet period before a draft write reaches the database
    pub draft_debounce: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            storage_dir: PathBuf::from("statement-files"),
            draft_debounce: Duration::from_millis(500),
        }
    }
}

/// State shared by all handlers
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
    /// Uploaded statement files
    pub store: FileStore,
    pub drafts: DraftDebouncer,
}

impl AppState {
    /// Build state for a database and configuration
    pub fn new(db: Database, config: ServerConfig, ai: Option<AIClient>) -> anyhow::Result<Self> {
        let store = FileStore::new(&config.storage_dir)?;
        let drafts = DraftDebouncer::new(db.clone(), config.draft_debounce);
        Ok(Self {
            db,
            config,
            ai,
            store,
            drafts,
        })
    }

    /// The configured LLM client, or a 500 naming the missing key
    pub fn ai_client(&self) -> Result<AIClient, AppError> {
        self.ai
            .clone()
            .ok_or_else(|| AppError::internal(AI_NOT_CONFIGURED))
    }

    pub fn processor(&self) -> Result<StatementProcessor, AppError> {
        Ok(StatementProcessor::new(
            self.db.clone(),
            self.store.clone(),
            self.ai_client()?,
        ))
    }

    pub fn enricher(&self) -> Result<Enricher, AppError> {
        Ok(Enricher::new(self.db.clone(), self.ai_client()?))
    }
}

/// How a caller was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Authentication disabled
    None,
    /// Identity header from the proxy
    Header,
    /// Bearer API key
    ApiKey,
}

/// The authenticated caller of a request
///
/// Inserted into request extensions by `auth_middleware`.
#[derive(Debug, Clone, Serialize)]
pub struct Caller {
    /// Acting user; `None` for an API key caller that named no user
    pub user: Option<String>,
    pub auth_method: AuthMethod,
}

impl Caller {
    /// The acting user, or 401 for a service caller without one
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user.as_deref().ok_or_else(AppError::unauthorized)
    }
}

/// Authentication middleware - resolves the caller from headers or API keys
///
/// # Security Notes
///
/// **Identity header**: `x-auth-user-email` is trusted as set by the
/// authenticating proxy. Only expose the server behind a proxy that strips
/// or rewrites this header on incoming requests.
///
/// **API keys**: compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_caller(&state.config, request.headers()) {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None => {
            warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
            AppError::unauthorized().into_response()
        }
    }
}

/// Resolve the caller for a request, `None` when it is not authenticated
pub(crate) fn resolve_caller(config: &ServerConfig, headers: &HeaderMap) -> Option<Caller> {
    let header_user = header_value(headers, AUTH_USER_HEADER);

    if !config.require_auth {
        return Some(Caller {
            user: Some(header_user.unwrap_or(LOCAL_DEV_USER).to_string()),
            auth_method: AuthMethod::None,
        });
    }

    if let Some(email) = header_user {
        return Some(Caller {
            user: Some(email.to_string()),
            auth_method: AuthMethod::Header,
        });
    }

    let api_key_valid = headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key.trim(), &config.api_keys))
        .unwrap_or(false);

    api_key_valid.then(|| Caller {
        user: header_value(headers, ACT_AS_USER_HEADER).map(str::to_string),
        auth_method: AuthMethod::ApiKey,
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Whether `provided` equals one of the configured API keys
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Length mismatch short-circuits; equal lengths compare in constant time
        if provided_bytes.len() == key_bytes.len() && provided_bytes.ct_eq(key_bytes).into() {
            return true;
        }
    }
    false
}

/// Parse a comma-separated list (API keys, origins), dropping empty entries
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// LLM backend from the environment (`AI_BACKEND`, `GEMINI_*`)
fn ai_from_env() -> Option<AIClient> {
    let ai = AIClient::from_env();
    match &ai {
        Some(client) => info!(
            backend = client.backend_name(),
            model = client.model(),
            "AI backend configured"
        ),
        None => info!("ℹ️  AI backend not configured (set GEMINI_API_KEY to enable extraction)"),
    }
    ai
}

/// Build the router
pub fn create_router(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<Router> {
    create_router_with_options(db, static_dir, config, ai_from_env())
}

/// Build the router with an explicit LLM backend (for testing)
pub fn create_router_with_options(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    ai: Option<AIClient>,
) -> anyhow::Result<Router> {
    let state = Arc::new(AppState::new(db, config, ai)?);
    Ok(router_for_state(state, static_dir))
}

fn router_for_state(state: Arc<AppState>, static_dir: Option<&str>) -> Router {
    let config = &state.config;

    let api_routes = Router::new()
        // Identity
        .route("/me", get(handlers::get_me))
        // Statements
        .route(
            "/statements",
            get(handlers::list_statements).post(handlers::create_statement),
        )
        .route(
            "/statements/:id",
            get(handlers::get_statement).delete(handlers::delete_statement),
        )
        .route(
            "/statements/:id/status",
            patch(handlers::update_statement_status),
        )
        .route("/statements/:id/file", post(handlers::upload_statement_file))
        .route("/statements/:id/process", post(handlers::process_statement))
        .route("/statements/:id/events", get(events::statement_events))
        .route(
            "/statements/:id/transactions",
            get(handlers::list_statement_transactions).post(handlers::save_statement_transactions),
        )
        .route("/statements/:id/enrich", post(handlers::enrich_statement))
        .route(
            "/statements/:id/enrichment-logs",
            get(handlers::list_enrichment_logs),
        )
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).patch(handlers::bulk_update_transactions),
        )
        .route(
            "/transactions/:id",
            patch(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        .route("/transactions/:id/keep", post(handlers::keep_transaction))
        .route("/duplicates", get(handlers::list_duplicates))
        // Reports
        .route("/dashboard", get(handlers::get_dashboard))
        // Functions
        .route("/functions/llm-proxy", post(handlers::llm_proxy))
        .route("/functions/ingest-receipt", post(handlers::ingest_receipt))
        .route(
            "/functions/process-statement",
            post(handlers::run_process_statement),
        )
        // Drafts
        .route(
            "/drafts/:key",
            get(handlers::get_draft).put(handlers::put_draft),
        );

    // Build CORS layer
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // No origins configured: same-origin only
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    // CSP: same-origin scripts, inline styles, blob:/data: for statement previews
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Web UI bundle
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Bind and serve until Ctrl-C, then flush pending drafts
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    // Extraction jobs do not survive a restart
    match db.recover_stuck_statements() {
        Ok(count) if count > 0 => {
            warn!(
                "⚠️  Marked {} interrupted statement(s) as failed; they can be retried",
                count
            );
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Failed to recover interrupted statements: {}", e);
        }
    }

    let state = Arc::new(AppState::new(db, config, ai_from_env())?);
    let app = router_for_state(state.clone(), static_dir);

    let addr = format!("{}:{}", host, port);
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;

    // Drafts still inside their debounce window
    state.drafts.flush();

    Ok(())
}

/// Error returned by handlers, rendered as `{"error": message}`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Authentication required".to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn payload_too_large(msg: &str) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error to its HTTP meaning
    ///
    /// Missing rows, bad input, and illegal status moves keep their message,
    /// as do LLM failures (500). Anything else is a sanitized internal error.
    pub fn from_core(err: tally_core::Error) -> Self {
        use tally_core::Error;
        match err {
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::InvalidData(msg) => Self::bad_request(&msg),
            e @ Error::InvalidTransition { .. } => Self::conflict(&e.to_string()),
            Error::Llm(msg) => Self::internal(&msg),
            other => other.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Details stay in the server log
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Client sees a fixed message
            message: "An internal error occurred".to_string(),
            // Logged, never sent
            internal: Some(err),
        }
    }
}
