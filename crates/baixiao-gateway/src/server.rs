//! HTTP and WebSocket servers using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use baixiao_agent::{ChatOrchestrator, PromptAssembler};
use baixiao_core::config::{BaixiaoConfig, SessionConfig};
use baixiao_knowledge::{Chunker, Ingestor, KnowledgeRetriever, KnowledgeStore};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Idle policy for WebSocket connections.
#[derive(Debug, Clone, Copy)]
pub struct IdlePolicy {
    pub timeout: Duration,
    pub check_interval: Duration,
}

impl IdlePolicy {
    pub fn from_config(session: &SessionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(session.idle_timeout_secs),
            // A zero interval would make `tokio::time::interval` panic.
            check_interval: Duration::from_secs(session.idle_check_interval_secs.max(1)),
        }
    }
}

/// Shared state for both servers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
    /// Knowledge base builder behind `/add_library`.
    pub ingestor: Arc<Ingestor>,
    pub idle: IdlePolicy,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator, ingestor: Arc<Ingestor>, idle: IdlePolicy) -> Self {
        Self {
            orchestrator,
            ingestor,
            idle,
            start_time: Instant::now(),
        }
    }
}

/// Long-lived components built once at startup.
pub struct Services {
    pub orchestrator: ChatOrchestrator,
    pub ingestor: Arc<Ingestor>,
    pub store: Arc<KnowledgeStore>,
}

/// Wire provider client, knowledge store, retriever and orchestrator.
///
/// Must be called from inside a tokio runtime: the blocking retriever and
/// ingestor keep a handle to it for their embedding calls.
pub fn build_services(config: &BaixiaoConfig) -> anyhow::Result<Services> {
    let client = baixiao_providers::create_client(&config.llm)?;

    let db_path = config.knowledge.resolved_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = match KnowledgeStore::open(&db_path) {
        Ok(store) => {
            let (sources, chunks) = store.stats();
            tracing::info!(
                "📚 Knowledge base: {} sources, {} chunks ({})",
                sources,
                chunks,
                db_path.display()
            );
            store
        }
        Err(e) => {
            tracing::error!("❌ Failed to open knowledge base: {e}, using in-memory store");
            KnowledgeStore::open(Path::new(":memory:"))?
        }
    };
    let store = Arc::new(store);

    let runtime = tokio::runtime::Handle::current();
    let retriever = KnowledgeRetriever::new(
        store.clone(),
        client.clone(),
        runtime.clone(),
        config.knowledge.top_k,
    );
    let ingestor = Ingestor::new(
        store.clone(),
        client.clone(),
        runtime,
        Chunker::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap),
    );

    let generation_timeout = Duration::from_secs(config.session.generation_timeout_secs);
    let orchestrator = ChatOrchestrator::new(
        Arc::new(retriever),
        client,
        PromptAssembler::new(config.identity.system_prompt.clone()),
    )
    .with_fragment_timeout(Some(generation_timeout));

    tracing::info!(
        "✅ Chat orchestrator ready (assistant={}, model={})",
        config.identity.name,
        config.llm.chat_model
    );

    Ok(Services {
        orchestrator,
        ingestor: Arc::new(ingestor),
        store,
    })
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any)
        .max_age(Duration::from_secs(3600))
}

/// Router for the HTTP listener.
pub fn build_http_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(super::routes::chat))
        .route("/add_library", post(super::routes::add_library))
        .route("/login", get(super::routes::login))
        .route("/health", get(super::routes::health_check))
        // Same protocol as the dedicated listener, for single-port deployments
        .route("/ws", get(super::ws::ws_handler))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the dedicated WebSocket listener.
pub fn build_ws_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(super::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start both listeners and serve until one of them fails.
pub async fn start(config: &BaixiaoConfig) -> anyhow::Result<()> {
    let services = build_services(config)?;
    let state = Arc::new(AppState::new(
        services.orchestrator,
        services.ingestor,
        IdlePolicy::from_config(&config.session),
    ));

    let gateway = &config.gateway;
    let http_addr = format!("{}:{}", gateway.host, gateway.http_port);
    let ws_addr = format!("{}:{}", gateway.host, gateway.ws_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
    let ws_listener = tokio::net::TcpListener::bind(&ws_addr).await?;

    tracing::info!("🌐 HTTP server listening on http://{}", http_addr);
    tracing::info!("🔌 WebSocket server listening on ws://{}", ws_addr);

    let http = axum::serve(http_listener, build_http_router(state.clone())).into_future();
    let ws = axum::serve(ws_listener, build_ws_router(state)).into_future();
    tokio::try_join!(http, ws)?;
    Ok(())
}
