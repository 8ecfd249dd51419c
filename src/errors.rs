//! Taxonomía de errores visible para el cliente de la API.
//!
//! Los fallos del reformulador no aparecen aquí: se absorben en la escalera
//! de decisión de `rag.rs`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    chunker::ChunkerError, document::DecodeError, embeddings::EmbeddingError,
    vector_store::VectorIndexError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Nieobsługiwany typ pliku: .{0}")]
    UnsupportedFileType(String),

    #[error("Plik za duży (max {limit_mb} MB)")]
    PayloadTooLarge { limit_mb: usize },

    #[error("Usługa {service} jest niedostępna: {message}")]
    ServiceUnavailable { service: &'static str, message: String },

    #[error("Błąd wewnętrzny: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Categoría estable que el cliente puede comprobar sin parsear el mensaje.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnsupportedFileType(_) => "unsupported_file_type",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(category = self.category(), "Error procesando la petición: {}", self);
        }
        let body = Json(json!({
            "detail": self.to_string(),
            "category": self.category(),
        }));
        (status, body).into_response()
    }
}

impl From<EmbeddingError> for AppError {
    fn from(err: EmbeddingError) -> Self {
        Self::ServiceUnavailable {
            service: "embeddings",
            message: err.to_string(),
        }
    }
}

impl From<VectorIndexError> for AppError {
    fn from(err: VectorIndexError) -> Self {
        Self::ServiceUnavailable {
            service: "vector-index",
            message: err.to_string(),
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Unsupported(ext) => Self::UnsupportedFileType(ext),
            other => Self::Validation(format!("Nie udało się odczytać pliku: {other}")),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(format!("Niepoprawne żądanie JSON: {}", rejection.body_text()))
    }
}

impl From<ChunkerError> for AppError {
    fn from(err: ChunkerError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("Tarea en segundo plano abortada: {err}"))
    }
}
