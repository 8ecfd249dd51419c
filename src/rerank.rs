//! Reordenación de hits combinando la similitud vectorial con señales
//! léxicas: solapamiento de palabras y frases exactas de la pregunta.
//!
//! Compensa que los modelos de embeddings infravaloren coincidencias
//! exactas de números o nombres propios (precios, nombres).

use std::collections::HashSet;

use crate::{
    models::Hit,
    text::{char_len, norm_text, words},
};

/// Longitudes de frase exacta buscadas, de mayor a menor.
const PHRASE_WINDOWS: [usize; 5] = [7, 6, 5, 4, 3];
const MIN_TERM_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    /// Peso por palabra de la pregunta presente en el hit.
    pub lexical_weight: f64,
    /// Bonificación única si el hit contiene una frase exacta de la pregunta.
    pub phrase_bonus: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            lexical_weight: 0.06,
            phrase_bonus: 0.35,
        }
    }
}

fn question_terms(question: &str) -> HashSet<String> {
    words(&question.to_lowercase())
        .filter(|w| char_len(w) >= MIN_TERM_CHARS)
        .map(str::to_string)
        .collect()
}

/// Número de palabras distintas de la pregunta (≥ 3 caracteres) que también
/// aparecen como palabra en `text`.
pub fn overlap_count(question: &str, text: &str) -> usize {
    let lowered = text.to_lowercase();
    let text_words: HashSet<&str> = words(&lowered).collect();
    question_terms(question)
        .iter()
        .filter(|term| text_words.contains(term.as_str()))
        .count()
}

/// `true` si alguna secuencia contigua de 3 a 7 palabras de la pregunta
/// aparece literalmente en el texto normalizado.
pub fn has_exact_phrase(question: &str, text: &str) -> bool {
    let lowered = question.to_lowercase();
    let q_words: Vec<&str> = words(&lowered).collect();
    let haystack = norm_text(text);

    PHRASE_WINDOWS.iter().any(|&size| {
        q_words.len() >= size
            && q_words
                .windows(size)
                .any(|window| haystack.contains(&window.join(" ")))
    })
}

pub fn blended_score(question: &str, hit: &Hit, weights: RerankWeights) -> f64 {
    let bonus = if has_exact_phrase(question, hit.text()) {
        weights.phrase_bonus
    } else {
        0.0
    };
    hit.score + weights.lexical_weight * overlap_count(question, hit.text()) as f64 + bonus
}

/// Ordena de forma estable por puntuación combinada descendente y se queda
/// con los `top_k` primeros. Los hits conservan su puntuación vectorial.
pub fn rerank(question: &str, hits: Vec<Hit>, top_k: usize, weights: RerankWeights) -> Vec<Hit> {
    let mut scored: Vec<(f64, Hit)> = hits
        .into_iter()
        .map(|hit| (blended_score(question, &hit, weights), hit))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, hit)| hit).collect()
}
