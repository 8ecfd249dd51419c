//! Compuertas de confianza: preguntas ininteligibles y evidencia
//! insuficiente en lo recuperado.

use crate::{
    models::Hit,
    rerank::{has_exact_phrase, overlap_count},
};

/// Proporción mínima de vocales entre las letras de una pregunta legible.
const MIN_VOWEL_RATIO: f64 = 0.2;
/// Una racha de consonantes más larga que esto no aparece en palabras
/// polacas ni inglesas reales.
const MAX_CONSONANT_RUN: usize = 5;

fn is_vowel(c: char) -> bool {
    c.to_lowercase().any(|l| "aeiouyąęóáéíúàèìòùäëïöüâêîôûåæøœ".contains(l))
}

/// Heurística previa a cualquier búsqueda: menos de dos letras, muy pocas
/// vocales o una racha imposible de consonantes.
pub fn is_gibberish(question: &str) -> bool {
    let letters: Vec<char> = question.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 2 {
        return true;
    }

    let vowels = letters.iter().filter(|c| is_vowel(**c)).count();
    if (vowels as f64) / (letters.len() as f64) < MIN_VOWEL_RATIO {
        return true;
    }

    let mut run = 0usize;
    for c in question.chars() {
        if c.is_alphabetic() && !is_vowel(c) {
            run += 1;
            if run > MAX_CONSONANT_RUN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Hay evidencia léxica si el hit comparte al menos dos palabras con la
/// pregunta o contiene una frase exacta suya.
pub fn lexical_ok(question: &str, top_hit: &Hit) -> bool {
    overlap_count(question, top_hit.text()) >= 2 || has_exact_phrase(question, top_hit.text())
}

/// Se responde salvo que la mejor similitud vectorial bruta esté por debajo
/// de `min_sim` y además no haya evidencia léxica.
pub fn is_answerable(raw_best_score: f64, top_hit: &Hit, question: &str, min_sim: f64) -> bool {
    !(raw_best_score < min_sim && !lexical_ok(question, top_hit))
}
