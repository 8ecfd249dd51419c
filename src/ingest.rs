//! Ingesta por sesión: documentos subidos y lotes de textos del CMS se
//! decodifican, se trocean, se embeben y se guardan en el índice vectorial.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    chunker,
    document::{decode, extension},
    errors::AppError,
    models::{Chunk, FileType},
};

/// Fuente asignada a los elementos del CMS que llegan sin identificador.
const CMS_DEFAULT_SOURCE: &str = "cms";

/// Resumen de la ingesta de un documento.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub filename: String,
    pub size_bytes: usize,
    pub chunks: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes): {} chunks indexados",
            self.filename, self.size_bytes, self.chunks
        )
    }
}

/// Elemento de texto estructurado importado desde el CMS.
#[derive(Debug, Clone, Deserialize)]
pub struct CmsItem {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
}

/// Ingiere un documento subido en la sesión indicada.
pub async fn ingest_document(
    state: &AppState,
    session_id: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<IngestSummary, AppError> {
    let settings = &state.config.rag;
    let filename = filename.trim().to_string();
    if filename.is_empty() {
        return Err(AppError::Validation("Brak nazwy pliku.".to_string()));
    }

    let file_type = FileType::from_filename(&filename);
    if !file_type.is_uploadable() {
        return Err(AppError::UnsupportedFileType(extension(&filename)));
    }
    if bytes.len() > settings.max_upload_bytes {
        return Err(AppError::PayloadTooLarge {
            limit_mb: settings.max_upload_bytes / (1024 * 1024),
        });
    }

    let size_bytes = bytes.len();
    let (size, overlap) = (settings.chunk_size, settings.chunk_overlap);
    let name = filename.clone();
    let texts = tokio::task::spawn_blocking(move || -> Result<Vec<String>, AppError> {
        let text = decode(&name, &bytes)?;
        Ok(chunker::split(&text, size, overlap)?)
    })
    .await??;

    if texts.is_empty() {
        warn!("'{filename}' no contiene texto útil; no se indexa nada.");
        return Ok(IngestSummary {
            filename,
            size_bytes,
            chunks: 0,
        });
    }

    let payloads: Vec<Chunk> = texts
        .iter()
        .enumerate()
        .map(|(idx, text)| Chunk {
            text: text.clone(),
            source: filename.clone(),
            file_type,
            chunk_id: idx as i64,
            session_id: session_id.to_string(),
        })
        .collect();
    let vectors = state.embedder.encode(&texts).await?;
    state.index.upsert(vectors, payloads).await?;

    let summary = IngestSummary {
        filename,
        size_bytes,
        chunks: texts.len(),
    };
    info!("Sesión '{session_id}': {summary}.");
    Ok(summary)
}

/// Ingiere un lote de textos del CMS. Cada elemento se trocea por separado
/// y sus `chunk_id` empiezan en 0. Devuelve el número de chunks indexados.
pub async fn ingest_items(state: &AppState, session_id: &str, items: Vec<CmsItem>) -> Result<usize, AppError> {
    let (size, overlap) = (state.config.rag.chunk_size, state.config.rag.chunk_overlap);
    let session = session_id.to_string();

    let payloads = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>, AppError> {
        let mut payloads = Vec::new();
        for item in items {
            let source = item
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| CMS_DEFAULT_SOURCE.to_string());
            for (idx, text) in chunker::split(&item.text, size, overlap)?.into_iter().enumerate() {
                payloads.push(Chunk {
                    text,
                    source: source.clone(),
                    file_type: FileType::Cms,
                    chunk_id: idx as i64,
                    session_id: session.clone(),
                });
            }
        }
        Ok(payloads)
    })
    .await??;

    if payloads.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = payloads.iter().map(|c| c.text.clone()).collect();
    let vectors = state.embedder.encode(&texts).await?;
    let count = payloads.len();
    state.index.upsert(vectors, payloads).await?;

    info!("Sesión '{session_id}': {count} chunks del CMS indexados.");
    Ok(count)
}

/// Elimina todos los chunks de la sesión. Devuelve cuántos se borraron.
pub async fn purge_session(state: &AppState, session_id: &str) -> Result<usize, AppError> {
    let deleted = state.index.delete_by_session(session_id).await?;
    info!("Sesión '{session_id}' purgada ({deleted} chunks).");
    Ok(deleted)
}
