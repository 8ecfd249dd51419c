//! Reformulador generativo sobre Rig (proveedor OpenAI).
//!
//! Su único trabajo es convertir el span elegido en una o dos frases
//! naturales. Puede estar caído o fallar: los errores se devuelven tipados y
//! la escalera de decisión de `rag.rs` los convierte en respaldo extractivo.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rig::completion::Prompt;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::{openai_api_key, AppConfig},
    models::ContextPassage,
};

/// Longitud máxima del fragmento enviado al modelo.
const MAX_CONTEXT_CHARS: usize = 900;
const READY_TIMEOUT: Duration = Duration::from_secs(8);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(20);

const SYSTEM_PROMPT: &str = "Przepisz podany fragment na 1–2 naturalne zdania po polsku, \
ODPOWIADAJĄC WYŁĄCZNIE NA PYTANIE. Nie dodawaj nowych faktów. \
Zachowaj liczby/kwoty/jednostki. Jeśli fragment nie zawiera odpowiedzi: \
'Nie mam tego w danych.'";

#[derive(Debug, Error)]
pub enum RephraseError {
    #[error("el reformulador no está configurado: {0}")]
    NotConfigured(String),

    #[error("el reformulador no respondió en {secs}s")]
    Timeout { secs: u64 },

    #[error("el reformulador respondió con error: {0}")]
    Provider(String),

    #[error("el reformulador devolvió una respuesta vacía")]
    EmptyOutput,
}

/// Estado del reformulador para el endpoint de salud.
#[derive(Debug, Clone, Serialize)]
pub struct LlmHealth {
    pub ok: bool,
    pub status: u16,
    pub ms: u128,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Colaborador que reformula un span como respuesta natural.
#[async_trait]
pub trait Rephraser: Send + Sync {
    /// Sonda barata de disponibilidad.
    async fn ready(&self) -> bool;

    /// Genera la reformulación usando sólo el primer contexto.
    async fn generate(
        &self,
        question: &str,
        contexts: &[ContextPassage],
    ) -> Result<String, RephraseError>;

    async fn healthcheck(&self) -> LlmHealth;
}

/// Gestor del modelo de chat.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub chat_model: String,
    pub api_base: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            chat_model: cfg.llm_chat_model.clone(),
            api_base: cfg.llm_api_base.clone(),
            timeout: cfg.rag.request_timeout,
            http: reqwest::Client::new(),
        }
    }

    async fn probe_models(&self, timeout: Duration) -> Result<u16, String> {
        let key = openai_api_key().ok_or_else(|| "Brak OPENAI_API_KEY".to_string())?;
        let response = self
            .http
            .get(format!("{}/models", self.api_base))
            .bearer_auth(key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }

    async fn answer_with_openai(&self, question: &str, fragment: &str) -> Result<String, RephraseError> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();
        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.1)
            .max_tokens(120)
            .build();

        let answer = tokio::time::timeout(self.timeout, agent.prompt(build_user_prompt(question, fragment)))
            .await
            .map_err(|_| RephraseError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| RephraseError::Provider(e.to_string()))?;

        Ok(answer)
    }
}

/// Prompt de usuario con el único fragmento candidato, recortado a 900 caracteres.
fn build_user_prompt(question: &str, fragment: &str) -> String {
    let fragment = fragment.trim();
    let fragment = if fragment.chars().count() > MAX_CONTEXT_CHARS {
        format!("{}…", fragment.chars().take(MAX_CONTEXT_CHARS).collect::<String>())
    } else {
        fragment.to_string()
    };
    format!("PYTANIE: {question}\nFRAGMENT:\n---\n{fragment}\n---\n\nODPOWIEDŹ (1–2 zdania):")
}

#[async_trait]
impl Rephraser for LlmManager {
    async fn ready(&self) -> bool {
        match self.probe_models(READY_TIMEOUT).await {
            Ok(status) => status == 200,
            Err(err) => {
                debug!("Sonda del reformulador fallida: {err}");
                false
            }
        }
    }

    async fn generate(
        &self,
        question: &str,
        contexts: &[ContextPassage],
    ) -> Result<String, RephraseError> {
        if openai_api_key().is_none() {
            return Err(RephraseError::NotConfigured("Brak OPENAI_API_KEY".to_string()));
        }
        let fragment = contexts.first().map(|c| c.text.as_str()).unwrap_or_default();
        let answer = self.answer_with_openai(question, fragment).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RephraseError::EmptyOutput);
        }
        Ok(answer.to_string())
    }

    async fn healthcheck(&self) -> LlmHealth {
        let started = Instant::now();
        let result = self.probe_models(HEALTH_TIMEOUT.min(self.timeout)).await;
        let ms = started.elapsed().as_millis();
        match result {
            Ok(status) => LlmHealth {
                ok: status == 200,
                status,
                ms,
                model: self.chat_model.clone(),
                error: None,
            },
            Err(error) => LlmHealth {
                ok: false,
                status: 0,
                ms,
                model: self.chat_model.clone(),
                error: Some(error),
            },
        }
    }
}
