//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + pipeline RAG).
//!
//! Toda la configuración se resuelve una única vez al arrancar y se inyecta
//! después en los componentes a través de `AppState`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

/// Parámetros del pipeline de recuperación y selección de respuestas.
#[derive(Clone, Debug)]
pub struct RagSettings {
    pub embedding_dim: usize,
    pub embed_batch_size: usize,
    pub request_timeout: Duration,
    pub min_sim: f64,
    pub max_upload_bytes: usize,
    pub default_session: String,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    pub search_k: usize,
    pub rerank_top_k: usize,
    pub lexical_weight: f64,
    pub phrase_bonus: f64,

    pub span_max_chars: usize,
    pub answer_max_chars: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            embedding_dim: 1536,
            embed_batch_size: 16,
            request_timeout: Duration::from_secs(90),
            min_sim: 0.10,
            max_upload_bytes: 20 * 1024 * 1024,
            default_session: "default".to_string(),
            chunk_size: 800,
            chunk_overlap: 120,
            search_k: 8,
            rerank_top_k: 5,
            lexical_weight: 0.06,
            phrase_bonus: 0.35,
            span_max_chars: 140,
            answer_max_chars: 220,
        }
    }
}

impl RagSettings {
    /// Comprueba las combinaciones que harían que el pipeline no avance.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE debe ser mayor que 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) debe ser estrictamente menor que CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.embed_batch_size == 0 {
            bail!("EMBED_BATCH debe ser mayor que 0");
        }
        if self.rerank_top_k == 0 || self.search_k == 0 {
            bail!("SEARCH_K y RERANK_TOP_K deben ser mayores que 0");
        }
        Ok(())
    }

    /// Sesión efectiva para una petición: la cabecera si viene informada,
    /// o la sesión por defecto.
    pub fn session_or_default(&self, session: Option<&str>) -> String {
        session
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_session)
            .to_string()
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,
    pub allow_origins: Vec<String>,

    pub llm_embedding_model: String,
    pub llm_embedding_fallback_model: Option<String>,
    pub llm_chat_model: String,
    pub llm_api_base: String,

    pub rag: RagSettings,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let neo4j_uri = env::var("NEO4J_URI")
            .map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?;
        let neo4j_user = env::var("NEO4J_USER")
            .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?;
        let neo4j_password = env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        let allow_origins = parse_origins(
            &env::var("ALLOW_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5500,http://127.0.0.1:5500".to_string()),
        );

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_embedding_fallback_model = env::var("LLM_EMBEDDING_FALLBACK_MODEL")
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_api_base = env::var("LLM_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        let defaults = RagSettings::default();
        let rag = RagSettings {
            embedding_dim: env_or("EMBEDDING_DIM", defaults.embedding_dim)?,
            embed_batch_size: env_or("EMBED_BATCH", defaults.embed_batch_size)?,
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            min_sim: env_or("MIN_SIM", defaults.min_sim)?,
            max_upload_bytes: env_or::<usize>("MAX_UPLOAD_MB", 20)? * 1024 * 1024,
            default_session: env::var("DEFAULT_SESSION")
                .unwrap_or(defaults.default_session),
            chunk_size: env_or("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            search_k: env_or("SEARCH_K", defaults.search_k)?,
            rerank_top_k: env_or("RERANK_TOP_K", defaults.rerank_top_k)?,
            lexical_weight: env_or("LEXICAL_WEIGHT", defaults.lexical_weight)?,
            phrase_bonus: env_or("PHRASE_BONUS", defaults.phrase_bonus)?,
            span_max_chars: env_or("SPAN_MAX_CHARS", defaults.span_max_chars)?,
            answer_max_chars: env_or("ANSWER_MAX_CHARS", defaults.answer_max_chars)?,
        };
        rag.validate()?;

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            allow_origins,
            llm_embedding_model,
            llm_embedding_fallback_model,
            llm_chat_model,
            llm_api_base,
            rag,
        })
    }
}

/// Lee una variable numérica; si no existe usa `default`, si no se puede
/// interpretar devuelve error con el nombre de la variable.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Valor inválido para {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Clave del proveedor OpenAI, sin comillas ni espacios. `None` si falta o
/// está vacía: el cliente de Rig entra en pánico sin ella.
pub fn openai_api_key() -> Option<String> {
    env::var("OPENAI_API_KEY")
        .ok()
        .map(|k| k.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|k| !k.is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}
