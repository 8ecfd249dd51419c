use crate::config::AppConfig;
use crate::vector_store::VectorIndexError;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph, VectorIndexError> {
    let url = Url::parse(&cfg.neo4j_uri)
        .map_err(|e| VectorIndexError::Connection(format!("NEO4J_URI inválida: {e}")))?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password)
        .await
        .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea el constraint de unicidad de los puntos y los índices de payload
/// usados para filtrar: sesión, origen y tipo de fichero.
pub async fn ensure_schema(graph: &Graph) -> Result<(), VectorIndexError> {
    let statements = [
        // Chunk.id único (identificador de punto)
        "CREATE CONSTRAINT chunk_id IF NOT EXISTS
         FOR (c:Chunk)
         REQUIRE c.id IS UNIQUE",
        "CREATE INDEX chunk_session_id IF NOT EXISTS
         FOR (c:Chunk) ON (c.session_id)",
        "CREATE INDEX chunk_source IF NOT EXISTS
         FOR (c:Chunk) ON (c.source)",
        "CREATE INDEX chunk_file_type IF NOT EXISTS
         FOR (c:Chunk) ON (c.file_type)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraint e índices de payload).");
    Ok(())
}
