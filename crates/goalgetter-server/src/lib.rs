//! HTTP front end for the Goalgetter assistant.
//!
//! Exposes the turn orchestrator over a small JSON API and a Telegram webhook.
//! The orchestrator is built once at startup and shared by every handler
//! through [`AppState`].

pub mod error;
pub mod models;
pub mod repl;
pub mod telegram;

pub use error::{Result, ServerError};
pub use telegram::TelegramClient;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json as AxumJson, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use goalgetter_core::agent::ProductivityAgent;
use goalgetter_core::config::{GoalgetterConfig, ServerSettings, ServiceConfig, SummaryStrategy};
use goalgetter_core::core_types::ThreadKey;
use goalgetter_core::diagnostics::MemoryStatus;
use goalgetter_core::llm::create_llm;
use goalgetter_core::memory::open_checkpoint_store;
use goalgetter_core::orchestrator::TurnOrchestrator;
use goalgetter_core::tools::connect_tools;
use models::{
    ChatRequest, ChatResponse, HealthResponse, TelegramUpdate, TelegramWebhookResponse,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const SUMMARY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            enable_cors: true,
            request_timeout: Duration::from_secs(120),
            max_body_size: 1024 * 1024,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(Self {
            bind_addr,
            enable_cors: settings.enable_cors,
            request_timeout: Duration::from_secs(settings.request_timeout),
            max_body_size: settings.max_body_bytes,
            enable_logging: true,
        })
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub service: ServiceConfig,
    pub telegram: Option<Arc<TelegramClient>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, service: ServiceConfig) -> Self {
        Self {
            orchestrator,
            service,
            telegram: None,
        }
    }

    pub fn with_telegram(mut self, client: TelegramClient) -> Self {
        self.telegram = Some(Arc::new(client));
        self
    }
}

/// Wires the checkpoint store, language model, tool bridge and agent into an
/// orchestrator. Storage problems degrade to volatile memory and a failing
/// tool bridge leaves the agent without tools; only an unusable model
/// configuration is fatal.
pub async fn build_orchestrator(config: &GoalgetterConfig) -> Result<TurnOrchestrator> {
    let store = open_checkpoint_store(&config.storage).await;
    log::info!("Checkpoint storage: {}", store.backend().as_str());

    let llm = create_llm(&config.llm)?;
    let tools = match connect_tools(&config.mcp).await {
        Ok(tools) => tools,
        Err(e) => {
            log::warn!("Tool bridge unavailable, continuing without tools: {}", e);
            None
        }
    };

    let agent = ProductivityAgent::from_settings(llm.clone(), tools, &config.agent);
    let summary_llm = match config.memory.summary.strategy {
        SummaryStrategy::Llm => Some(llm),
        _ => None,
    };
    Ok(TurnOrchestrator::from_config(
        config,
        store,
        Arc::new(agent),
        summary_llm,
    ))
}

async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Goalgetter Productivity Assistant API",
        "service": state.service.name,
        "version": state.service.version,
        "health": "/health",
        "endpoints": {
            "chat": "POST /chat",
            "memory": "GET /memory/{user_id}",
            "health": "GET /health",
            "telegram": "POST /telegram/telegram-webhook"
        }
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service.name.clone(),
        version: state.service.version.clone(),
        timestamp: chrono::Utc::now(),
        storage: state.orchestrator.storage_backend(),
    })
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Runs one chat turn and shapes the HTTP response.
pub async fn process_chat(state: &AppState, request: ChatRequest) -> Result<ChatResponse> {
    let identity = request
        .identity()
        .ok_or_else(|| ServerError::missing_field("user"))?;
    log::info!(
        "Chat request from user {} (chat {:?}, {} chars)",
        identity,
        request.chat_id,
        request.message.chars().count()
    );

    // Detached from the request future: a dropped connection does not cancel the turn.
    let orchestrator = state.orchestrator.clone();
    let turn_identity = identity.clone();
    let message = request.message.clone();
    let outcome = tokio::spawn(async move { orchestrator.chat(&turn_identity, message).await })
        .await
        .map_err(|e| ServerError::internal(format!("Turn task failed: {}", e)))??;
    let diagnostics = &outcome.diagnostics;
    log::info!(
        "Replied to user {} ({} chars, {} messages in thread, success: {})",
        identity,
        outcome.reply.chars().count(),
        diagnostics.message_count + 1,
        outcome.success
    );

    let user = request.user.as_ref();
    Ok(ChatResponse {
        success: outcome.success,
        summary: preview(&outcome.reply),
        action_type: "general".to_string(),
        suggestions: Vec::new(),
        next_steps: Vec::new(),
        data: Some(json!({
            "thread_id": diagnostics.thread_key,
            "user_id": identity,
            "user_name": user.map(|u| u.first_name.clone()),
            "username": user.and_then(|u| u.username.clone()),
            "language_code": user.and_then(|u| u.language_code.clone()),
            "chat_id": request.chat_id,
            "message_count": diagnostics.message_count,
            "forwarded_count": diagnostics.forwarded_count,
            "trim_tier": diagnostics.trim_tier,
            "checkpoint_version": diagnostics.checkpoint_version,
            "persisted": diagnostics.persisted,
            "storage": diagnostics.storage,
        })),
        error: diagnostics.error.clone(),
        message: outcome.reply,
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: std::result::Result<AxumJson<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let AxumJson(request) = payload.map_err(|e| ServerError::invalid_request(e.body_text()))?;
    Ok(Json(process_chat(&state, request).await?))
}

async fn memory_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<MemoryStatus>> {
    let thread_key = ThreadKey::for_user(&user_id)?;
    log::info!("Memory status request for thread {}", thread_key);
    Ok(Json(state.orchestrator.memory_status(&thread_key).await?))
}

async fn telegram_webhook_handler(
    State(state): State<AppState>,
    payload: std::result::Result<AxumJson<Value>, JsonRejection>,
) -> Json<TelegramWebhookResponse> {
    let payload = match payload {
        Ok(AxumJson(payload)) => payload,
        Err(e) => {
            log::error!("Rejected Telegram webhook body: {}", e.body_text());
            return Json(TelegramWebhookResponse::failed(e.body_text()));
        }
    };
    let update: TelegramUpdate = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(e) => {
            log::error!("Unreadable Telegram update: {}", e);
            return Json(TelegramWebhookResponse::failed(e.to_string()));
        }
    };
    log::info!("Telegram update {} ({})", update.update_id, update.kind());

    let Some(message) = update.message else {
        return Json(TelegramWebhookResponse::ok());
    };
    let (Some(from), Some(text)) = (message.from, message.text) else {
        log::info!("Ignoring Telegram message without sender or text");
        return Json(TelegramWebhookResponse::ok());
    };
    let chat_id = message.chat.id;

    let request = ChatRequest {
        message: text,
        user: Some(from),
        user_id: None,
        chat_id: Some(chat_id),
        message_id: message.message_id,
    };
    let reply = match process_chat(&state, request).await {
        Ok(response) if response.success => telegram::clean_reply(&response.message),
        Ok(response) => format!(
            "Sorry, I encountered an error: {}",
            response.error.as_deref().unwrap_or("Unknown error")
        ),
        Err(e) => {
            log::error!("Telegram turn failed: {}", e);
            return Json(TelegramWebhookResponse::failed(e.to_string()));
        }
    };

    match &state.telegram {
        Some(client) => {
            // The update is acknowledged even when delivery fails.
            if let Err(e) = client.send_message(chat_id, &reply).await {
                log::error!("Failed to deliver reply to chat {}: {}", chat_id, e);
            }
        }
        None => log::warn!("No Telegram bot token configured; reply to chat {} dropped", chat_id),
    }
    Json(TelegramWebhookResponse::ok())
}

pub struct GoalgetterServer {
    state: AppState,
    config: ServerConfig,
}

impl GoalgetterServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Turn routes are exempt from the request timeout: a turn is bounded by
    /// the orchestrator's reasoning timeout and always ends with a reply.
    pub fn build_router(&self) -> Router {
        let timed = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/memory/{user_id}", get(memory_handler))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.request_timeout,
            ));
        let turns = Router::new()
            .route("/chat", post(chat_handler))
            .route("/telegram/telegram-webhook", post(telegram_webhook_handler));

        let mut router = timed
            .merge(turns)
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(self.state.clone());

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::debug!(
                        "Response {} {} in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }

    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!(
                "Failed to bind to {}: {}",
                self.config.bind_addr, e
            ))
        })?;

        log::info!(
            "{} v{} listening on {}",
            self.state.service.name,
            self.state.service.version,
            self.config.bind_addr
        );
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Chat endpoint: http://{}/chat", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => log::info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use goalgetter_core::errors::AgentError;
    use goalgetter_core::memory::InMemoryCheckpointStore;
    use goalgetter_core::reasoning::{ReasoningRequest, ReasoningStep};
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl ReasoningStep for Echo {
        async fn invoke(&self, request: &ReasoningRequest) -> std::result::Result<String, AgentError> {
            Ok(format!("echo: {}", request.message))
        }
    }

    fn app() -> Router {
        let orchestrator = Arc::new(TurnOrchestrator::new(
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(Echo),
        ));
        let state = AppState::new(orchestrator, ServiceConfig::default());
        GoalgetterServer::new(state, ServerConfig::default()).build_router()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "volatile");
    }

    #[tokio::test]
    async fn test_chat_without_identity_is_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing_field");
    }

    #[test]
    fn test_preview_truncates_long_replies() {
        let long = "x".repeat(150);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(100)));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_server_config_from_settings() {
        let settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        let config = ServerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));

        let bad = ServerSettings {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(ServerConfig::from_settings(&bad).is_err());
    }
}
