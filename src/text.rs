//! Utilidades de normalización de texto compartidas por el chunker, el
//! generador de spans y el sintetizador de respuestas.
//!
//! Todas las longitudes se miden en caracteres, no en bytes: los documentos
//! contienen texto polaco con caracteres multibyte.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Longitud mínima del prefijo antes de aceptar un corte en fin de frase.
const SENTENCE_CUT_MIN_CHARS: usize = 80;

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.:;!?])").expect("regex válida"));

// "50 z." → "50 zł." (artefacto habitual al extraer PDFs)
static BROKEN_ZLOTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\s*z(\s|[,.])").expect("regex válida"));

/// Colapsa cualquier secuencia de espacios en blanco en un único espacio y
/// recorta los extremos.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Forma canónica para comparar textos: espacios colapsados y minúsculas.
pub fn norm_text(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Palabras en el sentido de `\w+`: secuencias de alfanuméricos o `_`.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Divide en frases tras `.`, `!` o `?` seguidos de espacio. El signo de
/// puntuación queda en la frase anterior.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            sentences.push(&text[start..idx]);
            let mut next_start = idx + c.len_utf8();
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_whitespace() {
                    break;
                }
                next_start = j + d.len_utf8();
                chars.next();
            }
            start = next_start;
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    sentences.push(&text[start..]);
    sentences
}

/// Pone en mayúscula la primera letra.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Recorta a `max_chars` prefiriendo terminar en un fin de frase situado más
/// allá de los primeros 80 caracteres; si no lo hay, corta en seco y añade `…`.
/// El resultado nunca supera `max_chars` caracteres.
pub fn truncate_preferring_sentence(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    for (pos, (byte_idx, c)) in text.char_indices().enumerate() {
        if pos >= max_chars {
            break;
        }
        if pos >= SENTENCE_CUT_MIN_CHARS && matches!(c, '.' | '!' | '?') {
            return text[..byte_idx + c.len_utf8()].to_string();
        }
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}…")
}

/// Limpieza de un span extraído antes de mostrarlo.
pub fn cleanup_span(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    let spaced = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");
    let repaired = BROKEN_ZLOTY.replace_all(&spaced, "${1} zł${2}");
    capitalize_first(&truncate_preferring_sentence(&repaired, max_chars))
}

/// Pulido genérico de una respuesta generada.
pub fn polish_answer(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    capitalize_first(&truncate_preferring_sentence(&collapsed, max_chars))
}

/// Dos textos son casi idénticos si tras normalizar coinciden o uno contiene
/// al otro. Un texto vacío se considera eco.
pub fn near_identical(a: &str, b: &str) -> bool {
    let (na, nb) = (norm_text(a), norm_text(b));
    na.is_empty() || na == nb || na.contains(&nb) || nb.contains(&na)
}
