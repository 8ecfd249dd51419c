//! Selección semántica del mejor span: se generan candidatos de todos los
//! fragmentos, se embeben junto a la pregunta y gana el de mayor coseno.

use crate::{
    embeddings::{l2_normalize, Embedder},
    errors::AppError,
    models::CandidateSpan,
    spans::candidate_spans,
    text::cleanup_span,
};

/// Tope de candidatos embebidos por consulta.
pub const MAX_CANDIDATES: usize = 80;

/// Span ganador ya limpio y el índice del fragmento del que procede.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSpan {
    pub text: String,
    pub origin: usize,
    pub score: f64,
}

/// Candidatos de todos los fragmentos, etiquetados con su origen y recortados
/// a `MAX_CANDIDATES` en orden de generación.
pub fn collect_candidates(fragments: &[String], max_chars: usize) -> Vec<CandidateSpan> {
    fragments
        .iter()
        .enumerate()
        .flat_map(|(origin, fragment)| {
            candidate_spans(fragment, max_chars)
                .into_iter()
                .map(move |text| CandidateSpan { text, origin })
        })
        .take(MAX_CANDIDATES)
        .collect()
}

/// Índice y puntuación del vector más parecido a `query`. En empate gana el
/// primero.
pub fn argmax_cosine(query: &[f64], vectors: &[Vec<f64>]) -> Option<(usize, f64)> {
    let query = l2_normalize(query.to_vec());
    let mut best: Option<(usize, f64)> = None;
    for (idx, vector) in vectors.iter().enumerate() {
        let vector = l2_normalize(vector.clone());
        let score: f64 = query.iter().zip(&vector).map(|(a, b)| a * b).sum();
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }
    best
}

/// Elige el mejor span para `question`. Reutiliza `question_vector` si se
/// proporciona. Devuelve `None` si ningún fragmento produce candidatos.
pub async fn best_span(
    embedder: &dyn Embedder,
    question: &str,
    fragments: Vec<String>,
    question_vector: Option<Vec<f64>>,
    max_chars: usize,
) -> Result<Option<BestSpan>, AppError> {
    let candidates =
        tokio::task::spawn_blocking(move || collect_candidates(&fragments, max_chars)).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let question_vector = match question_vector {
        Some(v) => v,
        None => embedder
            .encode(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default(),
    };
    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.encode(&texts).await?;

    let best = tokio::task::spawn_blocking(move || {
        argmax_cosine(&question_vector, &vectors).map(|(idx, score)| {
            let winner = &candidates[idx];
            BestSpan {
                text: cleanup_span(&winner.text, max_chars),
                origin: winner.origin,
                score,
            }
        })
    })
    .await?;

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::HashingEmbedder;

    #[test]
    fn candidate_pool_is_capped_in_generation_order() {
        let fragments: Vec<String> = (0..60)
            .map(|i| format!("Fragment numer {i} zawiera zdanie z informacjami. Drugie zdanie fragmentu {i} jest dłuższe od pierwszego."))
            .collect();
        let candidates = collect_candidates(&fragments, 60);
        assert_eq!(candidates.len(), MAX_CANDIDATES);
        assert_eq!(candidates[0].origin, 0);
        assert!(candidates.windows(2).all(|w| w[0].origin <= w[1].origin));
    }

    #[test]
    fn argmax_prefers_first_on_ties_and_tolerates_zero_vectors() {
        let vectors = vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![5.0, 0.0]];
        let (idx, score) = argmax_cosine(&[1.0, 0.0], &vectors).unwrap();
        assert_eq!(idx, 1);
        assert!((score - 1.0).abs() < 1e-9);
        assert_eq!(argmax_cosine(&[1.0, 0.0], &[]), None);
    }

    #[tokio::test]
    async fn verbatim_restatement_of_question_wins() {
        let embedder = HashingEmbedder::default();
        let question = "Ile kosztuje miesięczny bilet normalny w komunikacji miejskiej?";
        let fragments = vec![
            "Rozkład jazdy autobusów nocnych zmienia się od pierwszego marca.".to_string(),
            question.to_string(),
            "Punkty obsługi klienta są czynne od poniedziałku do piątku.".to_string(),
        ];

        let best = best_span(&embedder, question, fragments, None, 140)
            .await
            .unwrap()
            .expect("hay candidatos");
        assert_eq!(best.origin, 1);
        assert_eq!(best.text, question);
        assert!((best.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_candidates_means_no_span() {
        let embedder = HashingEmbedder::default();
        let best = best_span(&embedder, "Pytanie?", vec!["krótko".into()], None, 140)
            .await
            .unwrap();
        assert_eq!(best, None);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn precomputed_question_vector_is_reused() {
        let embedder = HashingEmbedder::default();
        let question = "Jak długo obowiązuje bilet miesięczny na wszystkie linie?";
        let question_vector = embedder.vector_for(question);
        let fragments = vec!["Bilet miesięczny obowiązuje przez trzydzieści dni na wszystkie linie.".to_string()];

        best_span(&embedder, question, fragments, Some(question_vector), 140)
            .await
            .unwrap();
        assert_eq!(embedder.calls(), 1);
    }
}
