//! División del texto de un documento en ventanas solapadas de tamaño fijo.

use thiserror::Error;

use crate::text::collapse_whitespace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("el solapamiento ({overlap}) debe ser menor que el tamaño del chunk ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Normaliza los espacios del texto y lo corta en ventanas de `size`
/// caracteres; cada ventana empieza `size - overlap` caracteres después de la
/// anterior. La última puede ser más corta. Texto vacío → sin chunks.
pub fn split(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkerError> {
    if overlap >= size {
        return Err(ChunkerError::OverlapTooLarge { size, overlap });
    }

    let normalized: Vec<char> = collapse_whitespace(text).chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    while start < normalized.len() {
        let end = (start + size).min(normalized.len());
        parts.push(normalized[start..end].iter().collect());
        if end == normalized.len() {
            break;
        }
        start = end - overlap;
    }

    Ok(parts)
}
