//! Embeddings a través de Rig (proveedor OpenAI).
//!
//! Los textos se envían en lotes de `EMBED_BATCH`. Cada lote se intenta
//! primero contra el modelo principal y, si falla, contra el modelo de
//! respaldo configurado. Los vectores devueltos se normalizan (L2).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{openai_api_key, AppConfig};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("el proveedor de embeddings ({model}) respondió con error: {message}")]
    Provider { model: String, message: String },

    #[error("el proveedor de embeddings no está configurado: {0}")]
    NotConfigured(String),

    #[error("el proveedor de embeddings no respondió en {secs}s")]
    Timeout { secs: u64 },

    #[error("número de embeddings ({actual}) distinto al número de textos ({expected})")]
    CountMismatch { expected: usize, actual: usize },
}

/// Colaborador que transforma textos en vectores de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Devuelve un vector normalizado por texto, en el mismo orden.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError>;
}

/// Normaliza un vector a norma 1. Un vector nulo se devuelve tal cual.
pub fn l2_normalize(mut vector: Vec<f64>) -> Vec<f64> {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Cliente de embeddings respaldado por Rig.
#[derive(Debug, Clone)]
pub struct RigEmbedder {
    models: Vec<String>,
    batch_size: usize,
    timeout: Duration,
    has_api_key: bool,
}

impl RigEmbedder {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut models = vec![cfg.llm_embedding_model.clone()];
        models.extend(cfg.llm_embedding_fallback_model.clone());
        Self {
            models,
            batch_size: cfg.rag.embed_batch_size,
            timeout: cfg.rag.request_timeout,
            has_api_key: openai_api_key().is_some(),
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        let mut last_err = None;
        for model in &self.models {
            match self.embed_with_openai(model, batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) => {
                    warn!("Fallo de embeddings con el modelo '{model}': {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EmbeddingError::Provider {
            model: "-".to_string(),
            message: "no hay modelos de embeddings configurados".to_string(),
        }))
    }

    async fn embed_with_openai(
        &self,
        model_name: &str,
        batch: &[String],
    ) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        use rig::providers::openai;
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;

        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(model_name);

        let embeddings = tokio::time::timeout(self.timeout, embedding_model.embed_texts(batch.to_vec()))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| EmbeddingError::Provider {
                model: model_name.to_string(),
                message: e.to_string(),
            })?;

        if embeddings.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: embeddings.len(),
            });
        }

        Ok(embeddings.into_iter().map(|e| l2_normalize(e.vec)).collect())
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        // Sin clave, `openai::Client::from_env` entra en pánico
        if !self.has_api_key {
            return Err(EmbeddingError::NotConfigured("Brak OPENAI_API_KEY".to_string()));
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            out.extend(self.embed_batch(batch).await?);
        }
        debug!("Calculados {} embeddings", out.len());
        Ok(out)
    }
}
