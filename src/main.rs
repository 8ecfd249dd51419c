// Módulos de la aplicación
mod api;
mod app_state;
mod chunker;
mod config;
mod document;
mod embeddings;
mod errors;
mod gate;
mod ingest;
mod llm;
mod models;
mod neo4j_client;
mod rag;
mod rerank;
mod scoring;
mod spans;
mod text;
mod vector_store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::AppState,
    embeddings::RigEmbedder,
    llm::LlmManager,
    vector_store::{Neo4jVectorIndex, VectorIndex},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Conectar a Neo4j y asegurar esquema e índice vectorial
    let graph = neo4j_client::connect_from_config(&cfg)
        .await
        .context("Error conectando a Neo4j")?;
    neo4j_client::ensure_schema(&graph)
        .await
        .context("Error asegurando el esquema de Neo4j")?;
    let index = Neo4jVectorIndex::new(Arc::new(graph));
    index
        .ensure_collection(cfg.rag.embedding_dim)
        .await
        .context("Error asegurando el índice vectorial")?;

    // 4. Colaboradores de embeddings y reformulación
    if config::openai_api_key().is_none() {
        warn!("Falta OPENAI_API_KEY: las consultas e ingestas responderán 503.");
    }
    let embedder = RigEmbedder::from_config(&cfg);
    let llm_manager = LlmManager::from_config(&cfg);

    // 5. Estado compartido de la aplicación
    let app_state = AppState {
        config: Arc::new(cfg),
        index: Arc::new(index),
        embedder: Arc::new(embedder),
        rephraser: Arc::new(llm_manager),
    };

    // 6. Router con CORS y trazas por petición
    let app = api::create_router(app_state.clone())
        .layer(cors_layer(&app_state.config.allow_origins))
        .layer(TraceLayer::new_for_http());

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{server_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

/// `*` permite cualquier origen; si no, sólo los orígenes válidos de la lista.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Origen CORS ignorado por inválido: {o}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}
