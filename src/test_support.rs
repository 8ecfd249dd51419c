//! Dobles de prueba: embedder determinista, reformulador guionizado y
//! construcción de `AppState` sobre el índice en memoria.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    app_state::AppState,
    config::{AppConfig, RagSettings},
    embeddings::{l2_normalize, Embedder, EmbeddingError},
    llm::{LlmHealth, RephraseError, Rephraser},
    models::ContextPassage,
    text::words,
    vector_store::memory::InMemoryVectorIndex,
};

const HASHING_DIM: usize = 512;

pub fn test_config() -> AppConfig {
    test_config_with(RagSettings::default())
}

pub fn test_config_with(rag: RagSettings) -> AppConfig {
    AppConfig {
        neo4j_uri: "bolt://localhost:7687".to_string(),
        neo4j_user: "neo4j".to_string(),
        neo4j_password: "test".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        allow_origins: vec!["*".to_string()],
        llm_embedding_model: "text-embedding-3-small".to_string(),
        llm_embedding_fallback_model: None,
        llm_chat_model: "gpt-4o-mini".to_string(),
        llm_api_base: "http://localhost:9".to_string(),
        rag: RagSettings {
            request_timeout: Duration::from_secs(5),
            ..rag
        },
    }
}

/// Bolsa de palabras con hashing (FNV-1a) a dimensión fija, normalizada.
/// Textos con palabras en común tienen coseno positivo.
#[derive(Default)]
pub struct HashingEmbedder {
    calls: AtomicUsize,
}

impl HashingEmbedder {
    /// Número de llamadas a `encode`.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; HASHING_DIM];
        for word in words(&text.to_lowercase()) {
            vector[fnv1a(word) % HASHING_DIM] += 1.0;
        }
        l2_normalize(vector)
    }
}

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Embedder que siempre falla, como un proveedor caído.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        Err(EmbeddingError::Timeout { secs: 5 })
    }
}

#[derive(Debug, Clone)]
enum Script {
    Down,
    Fails,
    Echo,
    Says(String),
}

/// Reformulador con comportamiento fijado de antemano.
pub struct ScriptedRephraser {
    script: Script,
}

impl ScriptedRephraser {
    fn new(script: Script) -> Self {
        Self { script }
    }

    /// `ready()` devuelve `false`.
    pub fn down() -> Self {
        Self::new(Script::Down)
    }

    pub fn fails() -> Self {
        Self::new(Script::Fails)
    }

    /// Devuelve el contexto recibido tal cual.
    pub fn echo() -> Self {
        Self::new(Script::Echo)
    }

    pub fn says(answer: &str) -> Self {
        Self::new(Script::Says(answer.to_string()))
    }
}

#[async_trait]
impl Rephraser for ScriptedRephraser {
    async fn ready(&self) -> bool {
        !matches!(self.script, Script::Down)
    }

    async fn generate(&self, _question: &str, contexts: &[ContextPassage]) -> Result<String, RephraseError> {
        match &self.script {
            Script::Down => Err(RephraseError::NotConfigured("down".to_string())),
            Script::Fails => Err(RephraseError::Provider("HTTP 500".to_string())),
            Script::Echo => Ok(contexts.first().map(|c| c.text.clone()).unwrap_or_default()),
            Script::Says(answer) => Ok(answer.clone()),
        }
    }

    async fn healthcheck(&self) -> LlmHealth {
        let ok = !matches!(self.script, Script::Down);
        LlmHealth {
            ok,
            status: if ok { 200 } else { 0 },
            ms: 1,
            model: "scripted".to_string(),
            error: (!ok).then(|| "down".to_string()),
        }
    }
}

/// Estado de aplicación con índice en memoria y embedder de hashing.
/// Devuelve también los dobles concretos para inspeccionarlos.
pub fn test_state(rephraser: ScriptedRephraser) -> (AppState, Arc<InMemoryVectorIndex>, Arc<HashingEmbedder>) {
    test_state_with(RagSettings::default(), rephraser)
}

pub fn test_state_with(
    rag: RagSettings,
    rephraser: ScriptedRephraser,
) -> (AppState, Arc<InMemoryVectorIndex>, Arc<HashingEmbedder>) {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let state = AppState {
        config: Arc::new(test_config_with(rag)),
        index: index.clone(),
        embedder: embedder.clone(),
        rephraser: Arc::new(rephraser),
    };
    (state, index, embedder)
}
