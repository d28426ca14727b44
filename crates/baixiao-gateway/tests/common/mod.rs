#![allow(dead_code)]

use async_trait::async_trait;
use baixiao_agent::{ChatOrchestrator, PromptAssembler};
use baixiao_core::error::{BaixiaoError, Result};
use baixiao_core::traits::{Embedder, Generator, Retriever, TokenStream};
use baixiao_core::types::Prompt;
use baixiao_gateway::{AppState, IdlePolicy};
use baixiao_knowledge::{Chunker, Ingestor, KnowledgeStore};
use futures::StreamExt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct StaticRetriever {
    pub calls: AtomicUsize,
}

impl Retriever for StaticRetriever {
    fn retrieve(&self, _query: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["百晓喵 lives in the library.".to_string()])
    }
}

pub enum Script {
    Fragments(Vec<&'static str>),
    FailAfter(Vec<&'static str>, &'static str),
    Hang,
}

pub struct ScriptedGenerator {
    pub script: Script,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, _prompt: &Prompt) -> Result<TokenStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<String>> = match &self.script {
            Script::Fragments(f) => f.iter().map(|s| Ok(s.to_string())).collect(),
            Script::FailAfter(f, msg) => f
                .iter()
                .map(|s| Ok(s.to_string()))
                .chain(std::iter::once(Err(BaixiaoError::Generation(msg.to_string()))))
                .collect(),
            Script::Hang => return Ok(futures::stream::pending().boxed()),
        };
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Same vector for every text: enough to exercise ingestion.
pub struct UnitEmbedder;

#[async_trait]
impl Embedder for UnitEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub retriever: Arc<StaticRetriever>,
    pub generator: Arc<ScriptedGenerator>,
    pub store: Arc<KnowledgeStore>,
}

pub const RELAXED: IdlePolicy = IdlePolicy {
    timeout: Duration::from_secs(300),
    check_interval: Duration::from_secs(10),
};

/// Must be called from inside a tokio runtime.
pub fn harness(script: Script, idle: IdlePolicy) -> Harness {
    let retriever = Arc::new(StaticRetriever {
        calls: AtomicUsize::new(0),
    });
    let generator = Arc::new(ScriptedGenerator {
        script,
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());
    let ingestor = Ingestor::new(
        store.clone(),
        Arc::new(UnitEmbedder),
        tokio::runtime::Handle::current(),
        Chunker::new(250, 0),
    );
    let orchestrator = ChatOrchestrator::new(
        retriever.clone(),
        generator.clone(),
        PromptAssembler::new("persona"),
    );
    let state = Arc::new(AppState::new(orchestrator, Arc::new(ingestor), idle));
    Harness {
        state,
        retriever,
        generator,
        store,
    }
}

/// Serve the WebSocket router on an ephemeral port.
pub async fn spawn_ws(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = baixiao_gateway::build_ws_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
