//! Modelos de dominio (chunks indexados, resultados de búsqueda y respuestas).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tipo de origen de un chunk. Se persiste como texto en minúsculas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Txt,
    Md,
    Pdf,
    Docx,
    Csv,
    Cms,
    Unknown,
}

impl FileType {
    /// Deduce el tipo a partir de la extensión del nombre de fichero.
    pub fn from_filename(filename: &str) -> Self {
        match filename.rsplit_once('.') {
            Some((_, ext)) => Self::parse(ext),
            None => Self::Unknown,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "txt" => Self::Txt,
            "md" => Self::Md,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "csv" => Self::Csv,
            "cms" => Self::Cms,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Csv => "csv",
            Self::Cms => "cms",
            Self::Unknown => "unknown",
        }
    }

    /// Formatos que el decodificador de documentos sabe leer.
    pub fn is_uploadable(&self) -> bool {
        matches!(self, Self::Txt | Self::Md | Self::Pdf | Self::Docx | Self::Csv)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trozo de texto indexado. Inmutable una vez almacenado.
/// `chunk_id` es denso y único dentro de `(session_id, source)` por ingesta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub file_type: FileType,
    pub chunk_id: i64,
    pub session_id: String,
}

/// Resultado de la búsqueda vectorial para un chunk. El `score` sólo es
/// comparable con otros hits de la misma consulta.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub chunk: Chunk,
    pub score: f64,
}

impl Hit {
    pub fn text(&self) -> &str {
        &self.chunk.text
    }

    /// Atribución legible: `"{source} (score 0.42)"`.
    pub fn attribution(&self) -> String {
        format!("{} (score {:.2})", self.chunk.source, self.score)
    }
}

/// Fragmento candidato a respuesta, etiquetado con el índice del fragmento
/// del que procede.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSpan {
    pub text: String,
    pub origin: usize,
}

/// Contexto que se entrega al reformulador.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPassage {
    pub text: String,
    pub source: String,
}

/// Respuesta final de una consulta. Nunca se persiste.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

impl Answer {
    pub fn without_sources(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
        }
    }
}
