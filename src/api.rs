use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Json, Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use url::Url;

use crate::{
    app_state::AppState,
    errors::AppError,
    ingest::{self, CmsItem, IngestSummary},
    llm::LlmHealth,
    models::Answer,
    rag,
};

/// Cabecera con la que el widget identifica la conversación.
pub const SESSION_HEADER: &str = "x-chat-id";
/// Margen sobre `MAX_UPLOAD_MB` para las cabeceras del multipart.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Deserialize)]
pub struct CmsPayload {
    #[serde(default)]
    items: Vec<CmsItem>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    ok: bool,
    #[serde(flatten)]
    summary: IngestSummary,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.rag.max_upload_bytes + MULTIPART_SLACK_BYTES;
    Router::new()
        .route("/ask", post(ask_handler))
        .route("/upload", post(upload_handler))
        .route("/cms", post(cms_handler))
        .route("/session", delete(purge_session_handler))
        .route("/health", get(health_handler))
        .route("/llm-health", get(llm_health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}

/// Sesión de la petición: cabecera `X-Chat-Id` o la sesión por defecto.
fn session_from(headers: &HeaderMap, state: &AppState) -> String {
    let raw = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    state.config.rag.session_or_default(raw)
}

// --- Handlers ---

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AskPayload>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(payload) = payload?;
    let session_id = session_from(&headers, &state);
    let answer = rag::rag_query(&state, &session_id, &payload.question).await?;
    Ok(Json(answer))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session_id = session_from(&headers, &state);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &state))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, &state))?;
        let summary = ingest::ingest_document(&state, &session_id, &filename, bytes.to_vec()).await?;
        return Ok(Json(UploadResponse { ok: true, summary }));
    }

    Err(AppError::Validation("Brak pliku w polu 'file'.".to_string()))
}

fn multipart_error(err: MultipartError, state: &AppState) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            limit_mb: state.config.rag.max_upload_bytes / (1024 * 1024),
        }
    } else {
        AppError::Validation(format!("Niepoprawne żądanie multipart: {}", err.body_text()))
    }
}

#[axum::debug_handler]
async fn cms_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CmsPayload>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload?;
    let session_id = session_from(&headers, &state);
    let count = ingest::ingest_items(&state, &session_id, payload.items).await?;
    Ok(Json(json!({ "ok": true, "count": count })))
}

#[axum::debug_handler]
async fn purge_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session_id = session_from(&headers, &state);
    let deleted = ingest::purge_session(&state, &session_id).await?;
    Ok(Json(json!({ "ok": true, "session_id": session_id, "deleted": deleted })))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cfg = &state.config;
    // Neo4j Browser escucha en HTTP 7474 del mismo host que el bolt
    let browser_url = Url::parse(&cfg.neo4j_uri)
        .ok()
        .and_then(|url| url.host_str().map(|host| format!("http://{host}:7474")))
        .unwrap_or_else(|| "http://localhost:7474".to_string());

    Json(json!({
        "status": "ok",
        "backend": "neo4j",
        "neo4j_browser": browser_url,
        "embedding_model": cfg.llm_embedding_model,
        "embedding_dim": cfg.rag.embedding_dim,
        "chat_model": cfg.llm_chat_model,
        "default_session": cfg.rag.default_session,
    }))
}

#[axum::debug_handler]
async fn llm_health_handler(State(state): State<AppState>) -> Json<LlmHealth> {
    let health = state.rephraser.healthcheck().await;
    if !health.ok {
        info!("Reformulador no disponible: {:?}", health.error);
    }
    Json(health)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::RagSettings,
        rag::MSG_NO_DATA,
        test_support::{test_state, test_state_with, ScriptedRephraser},
    };

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(session: &str, filename: &str, content: &[u8]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(SESSION_HEADER, session)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(filename, content)))
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, session: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn upload_then_ask_in_the_same_session() {
        let (state, _, _) = test_state(ScriptedRephraser::down());
        let router = create_router(state);

        let (status, body) = send(
            router.clone(),
            upload_request("czat-1", "bilety.txt", "Cena biletu wynosi 50 zł. Bilet obowiązuje przez 30 dni.".as_bytes()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["filename"], "bilety.txt");
        assert_eq!(body["chunks"], 1);

        let ask = json!({ "question": "Jaka jest cena biletu?" });
        let (status, body) = send(router.clone(), json_request(Method::POST, "/ask", Some("czat-1"), ask.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().contains("50 zł"));
        assert!(body["sources"][0].as_str().unwrap().starts_with("bilety.txt"));

        let (status, body) = send(router, json_request(Method::POST, "/ask", None, ask)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], MSG_NO_DATA);
        assert_eq!(body["sources"], json!([]));
    }

    #[tokio::test]
    async fn malformed_json_bodies_are_validation_errors() {
        let (state, _, _) = test_state(ScriptedRephraser::down());
        let router = create_router(state);

        let (status, body) = send(router.clone(), json_request(Method::POST, "/ask", None, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation");
        assert!(body["detail"].as_str().unwrap().starts_with("Niepoprawne żądanie JSON"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/cms")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"items\": [ nie-json"))
            .unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation");
    }

    #[tokio::test]
    async fn unsupported_upload_is_415_with_category() {
        let (state, _, _) = test_state(ScriptedRephraser::down());
        let (status, body) = send(create_router(state), upload_request("s", "slajdy.pptx", b"abc")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["category"], "unsupported_file_type");
        assert_eq!(body["detail"], "Nieobsługiwany typ pliku: .pptx");
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let settings = RagSettings {
            max_upload_bytes: 1024 * 1024,
            ..RagSettings::default()
        };
        let (state, _, _) = test_state_with(settings, ScriptedRephraser::down());
        let content = vec![b'a'; 1024 * 1024 + 10];
        let (status, body) = send(create_router(state), upload_request("s", "duzy.txt", &content)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["detail"], "Plik za duży (max 1 MB)");
    }

    #[tokio::test]
    async fn cms_import_and_session_purge() {
        let (state, index, _) = test_state(ScriptedRephraser::down());
        let router = create_router(state);

        let items = json!({ "items": [
            { "id": "faq-1", "text": "Biuro obsługi klienta jest czynne od 8 do 16." },
            { "text": "Bilety ulgowe przysługują uczniom i studentom." }
        ]});
        let (status, body) = send(router.clone(), json_request(Method::POST, "/cms", Some("cms-czat"), items)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(index.point_count("cms-czat"), 2);

        let (status, body) = send(router, json_request(Method::DELETE, "/session", Some("cms-czat"), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "cms-czat");
        assert_eq!(body["deleted"], 2);
        assert_eq!(index.point_count("cms-czat"), 0);
    }

    #[tokio::test]
    async fn health_endpoints_describe_the_service() {
        let (state, _, _) = test_state(ScriptedRephraser::down());
        let router = create_router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "neo4j");
        assert_eq!(body["embedding_dim"], 1536);
        assert_eq!(body["neo4j_browser"], "http://localhost:7474");

        let request = Request::builder().uri("/llm-health").body(Body::empty()).unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "down");
    }
}
