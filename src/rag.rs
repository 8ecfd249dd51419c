//! Consulta RAG por sesión con respuesta corta y atribuida.
//!
//! Escalera de decisión:
//!   1. Pregunta ininteligible → mensaje fijo, sin fuentes.
//!   2. Búsqueda vectorial; sin hits → "sin datos en este chat".
//!   3. Reordenación léxica + compuerta de confianza; si falla → "no lo
//!      tengo en los datos" con la fuente del mejor hit bruto.
//!   4. Mejor span de los hits reordenados (o el texto del primer hit).
//!   5. Reformulador caído, con error o que sólo repite el span → frase
//!      única extraída del span.
//!   6. En otro caso, la reformulación pulida.

use tracing::{debug, info, warn};

use crate::{
    app_state::AppState,
    errors::AppError,
    gate::{is_answerable, is_gibberish},
    llm::{RephraseError, Rephraser},
    models::{Answer, ContextPassage, Hit},
    rerank::{rerank, RerankWeights},
    scoring::best_span,
    spans::one_sentence_from_span,
    text::{near_identical, norm_text, polish_answer},
};

pub const MSG_GIBBERISH: &str = "Nie zrozumiałem pytania. Spróbuj zadać je inaczej.";
pub const MSG_NO_DATA: &str =
    "Brak danych w tym czacie. Wgraj plik lub zaimportuj CMS i spróbuj ponownie.";
pub const MSG_NOT_IN_DATA: &str = "Nie mam tego w danych.";

/// Resultado de intentar reformular el span, consumido como dato por la
/// escalera de decisión.
#[derive(Debug)]
pub enum RephraseOutcome {
    Rephrased(String),
    Unavailable,
    Failed(RephraseError),
}

/// Lanza una consulta RAG sobre los chunks de `session_id`.
pub async fn rag_query(state: &AppState, session_id: &str, question: &str) -> Result<Answer, AppError> {
    let settings = &state.config.rag;
    let question = question.trim();

    // 1) Pregunta sin sentido: ni siquiera se busca
    if is_gibberish(question) {
        info!("Pregunta no comprendida en la sesión '{session_id}'.");
        return Ok(Answer::without_sources(MSG_GIBBERISH));
    }

    // 2) Embedding de la pregunta y búsqueda vectorial en la sesión
    let question_vector = state
        .embedder
        .encode(&[question.to_string()])
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();
    let hits = state
        .index
        .search(&question_vector, settings.search_k, session_id)
        .await?;

    let Some(top_raw) = hits.iter().reduce(|best, h| if h.score > best.score { h } else { best }).cloned() else {
        return Ok(Answer::without_sources(MSG_NO_DATA));
    };

    // 3) Reordenación y compuerta de confianza
    let weights = RerankWeights {
        lexical_weight: settings.lexical_weight,
        phrase_bonus: settings.phrase_bonus,
    };
    let reranked = rerank(question, hits, settings.rerank_top_k, weights);
    let Some(top) = reranked.first() else {
        return Ok(Answer::without_sources(MSG_NO_DATA));
    };
    if !is_answerable(top_raw.score, top, question, settings.min_sim) {
        info!(
            "Compuerta de confianza: score bruto {:.3} < {:.2} sin evidencia léxica.",
            top_raw.score, settings.min_sim
        );
        return Ok(Answer {
            answer: MSG_NOT_IN_DATA.to_string(),
            sources: vec![top_raw.attribution()],
        });
    }

    // 4) Mejor span entre los fragmentos reordenados
    let fragments: Vec<String> = reranked.iter().map(|h| h.text().to_string()).collect();
    let best = best_span(
        state.embedder.as_ref(),
        question,
        fragments,
        Some(question_vector),
        settings.span_max_chars,
    )
    .await?;
    let (span, origin) = match best {
        Some(best) => {
            debug!("Mejor span con coseno {:.3}.", best.score);
            (best.text, Some(best.origin))
        }
        None => (top.text().to_string(), None),
    };
    let chosen = attribute_source(&span, origin, &reranked, top);
    debug!("Span elegido de '{}': {}", chosen.chunk.source, span);

    // 5-6) Reformulación con un único contexto
    let context = ContextPassage {
        text: span.clone(),
        source: chosen.chunk.source.clone(),
    };
    let outcome = rephrase(state.rephraser.as_ref(), question, context).await;
    let answer = compose_answer(outcome, &span, question, settings.answer_max_chars);

    Ok(Answer {
        answer,
        sources: vec![chosen.attribution()],
    })
}

/// Hit del que procede realmente el span: el de origen si lo contiene, si no
/// el primero cuyo texto normalizado lo contenga, y en último caso el origen
/// o el primer hit reordenado.
pub fn attribute_source<'a>(span: &str, origin: Option<usize>, reranked: &'a [Hit], top: &'a Hit) -> &'a Hit {
    let needle = norm_text(span.trim_end_matches('…'));
    let contains = |hit: &Hit| !needle.is_empty() && norm_text(hit.text()).contains(&needle);
    let origin_hit = origin.and_then(|i| reranked.get(i));

    origin_hit
        .filter(|hit| contains(hit))
        .or_else(|| reranked.iter().find(|hit| contains(hit)))
        .or(origin_hit)
        .unwrap_or(top)
}

async fn rephrase(rephraser: &dyn Rephraser, question: &str, context: ContextPassage) -> RephraseOutcome {
    if !rephraser.ready().await {
        warn!("Reformulador no disponible; se responde de forma extractiva.");
        return RephraseOutcome::Unavailable;
    }
    match rephraser.generate(question, &[context]).await {
        Ok(text) => RephraseOutcome::Rephrased(text),
        Err(err) => {
            warn!("Reformulador con error ({err}); se responde de forma extractiva.");
            RephraseOutcome::Failed(err)
        }
    }
}

/// Texto final a partir del resultado del reformulador y del span elegido.
pub fn compose_answer(outcome: RephraseOutcome, span: &str, question: &str, max_chars: usize) -> String {
    let answer = match outcome {
        RephraseOutcome::Rephrased(raw) if near_identical(&raw, span) => {
            info!("La reformulación sólo repite el fragmento; se usa la frase extraída.");
            one_sentence_from_span(span, question, max_chars)
        }
        RephraseOutcome::Rephrased(raw) => polish_answer(&raw, max_chars),
        RephraseOutcome::Unavailable | RephraseOutcome::Failed(_) => {
            one_sentence_from_span(span, question, max_chars)
        }
    };

    if answer.is_empty() {
        MSG_NOT_IN_DATA.to_string()
    } else {
        answer
    }
}
