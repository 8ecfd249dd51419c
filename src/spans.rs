//! Generación de spans candidatos a respuesta a partir de un fragmento
//! recuperado.
//!
//! Se combinan dos estrategias: agrupación de frases consecutivas hasta
//! `max_chars` y una ventana deslizante de `max_chars` caracteres. El
//! resultado se filtra (longitud mínima, exceso de mayúsculas) y se
//! deduplica preservando el orden de aparición.

use std::collections::HashSet;

use crate::text::{char_len, cleanup_span, collapse_whitespace, split_sentences, words};

/// Spans más cortos que esto casi nunca contienen una respuesta completa.
pub const MIN_SPAN_CHARS: usize = 30;
/// Proporción de mayúsculas a partir de la cual un span se trata como
/// cabecera o ruido.
pub const MAX_UPPERCASE_RATIO: f64 = 0.6;
/// Avance mínimo de la ventana deslizante.
const MIN_WINDOW_STEP: usize = 40;
/// Longitud máxima de la frase única de respaldo.
pub const ONE_SENTENCE_MAX_CHARS: usize = 160;

/// Propone spans candidatos (cada uno de como mucho `max_chars` caracteres)
/// para un fragmento.
pub fn candidate_spans(fragment: &str, max_chars: usize) -> Vec<String> {
    let text = collapse_whitespace(fragment);
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let mut candidates = sentence_groups(&text, max_chars);
    candidates.extend(sliding_windows(&text, max_chars));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| char_len(c) >= MIN_SPAN_CHARS && uppercase_ratio(c) < MAX_UPPERCASE_RATIO)
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// Empaqueta frases consecutivas mientras quepan en `max_chars`. Una frase
/// que por sí sola excede el límite no se emite aquí; la ventana deslizante
/// ya cubre ese texto.
fn sentence_groups(text: &str, max_chars: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut buf = String::new();

    for sentence in split_sentences(text) {
        if buf.is_empty() {
            buf = sentence.to_string();
        } else if char_len(&buf) + 1 + char_len(sentence) <= max_chars {
            buf.push(' ');
            buf.push_str(sentence);
        } else {
            groups.push(std::mem::replace(&mut buf, sentence.to_string()));
        }
    }
    if !buf.is_empty() {
        groups.push(buf);
    }

    groups.retain(|g| char_len(g) <= max_chars);
    groups
}

fn sliding_windows(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = MIN_WINDOW_STEP.max(max_chars / 2);
    // Al menos una ventana aunque el texto sea más corto que `max_chars`.
    let last_start = chars.len().saturating_sub(max_chars);

    (0..=last_start)
        .step_by(step)
        .map(|start| {
            let end = (start + max_chars).min(chars.len());
            chars[start..end].iter().collect()
        })
        .collect()
}

fn uppercase_ratio(text: &str) -> f64 {
    let (upper, alpha) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(u, a), c| (u + usize::from(c.is_uppercase()), a + 1));
    upper as f64 / alpha.max(1) as f64
}

/// Respaldo extractivo: de las frases del span elige la primera que contiene
/// más palabras de la pregunta (palabras de más de 2 caracteres) y la limpia.
pub fn one_sentence_from_span(span: &str, question: &str, pool_max_chars: usize) -> String {
    let cleaned = cleanup_span(span, pool_max_chars);
    let question = question.to_lowercase();
    let q_words: HashSet<&str> = words(&question).filter(|w| char_len(w) > 2).collect();

    let mut best = "";
    let mut best_hits = None;
    for sentence in split_sentences(&cleaned) {
        let lowered = sentence.to_lowercase();
        let hits = q_words.iter().filter(|w| lowered.contains(**w)).count();
        if best_hits.map_or(true, |b| hits > b) {
            best = sentence;
            best_hits = Some(hits);
        }
    }

    cleanup_span(best, ONE_SENTENCE_MAX_CHARS)
}
