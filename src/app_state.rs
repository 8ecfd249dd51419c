use std::sync::Arc;

use crate::{
    config::AppConfig, embeddings::Embedder, llm::Rephraser, vector_store::VectorIndex,
};

/// Contexto explícito de la aplicación: se construye una vez al arrancar y
/// se comparte entre peticiones concurrentes sin estado mutable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub rephraser: Arc<dyn Rephraser>,
}
