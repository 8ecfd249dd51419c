//! Índice vectorial de chunks particionado por sesión.
//!
//! API pública:
//!   - trait `VectorIndex` (ensure_collection, upsert, search, delete_by_session)
//!   - `Neo4jVectorIndex`, implementación sobre el índice vectorial de Neo4j.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use neo4rs::{query, Graph};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{Chunk, FileType, Hit};

pub const CHUNK_INDEX_NAME: &str = "chunkEmbeddingIndex";

/// Búsqueda exacta dentro de la sesión. `queryNodes` ordena vecinos de todas
/// las sesiones y un filtro posterior puede dejar fuera los de ésta; aquí el
/// `MATCH` usa el índice `chunk_session_id` y sólo se puntúan sus chunks.
/// `vector.similarity.cosine` devuelve el coseno reescalado a [0, 1].
pub const SESSION_SEARCH_CYPHER: &str = "\
MATCH (c:Chunk {session_id: $session_id})
WITH c, vector.similarity.cosine(c.embedding, $embedding) AS similarity
ORDER BY similarity DESC
LIMIT $k
RETURN c.text AS text, c.source AS source, c.file_type AS file_type,
       c.chunk_id AS chunk_id, c.session_id AS session_id,
       2.0 * similarity - 1.0 AS score";

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("no se pudo conectar con el índice vectorial: {0}")]
    Connection(String),

    #[error("el índice '{index}' tiene dimensión {actual}, se esperaba {expected}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("número de vectores ({vectors}) distinto al de payloads ({payloads})")]
    LengthMismatch { vectors: usize, payloads: usize },

    #[error("consulta al índice vectorial fallida: {0}")]
    Query(String),

    #[error("fila incompleta en el resultado: falta '{0}'")]
    MissingField(&'static str),
}

impl From<neo4rs::Error> for VectorIndexError {
    fn from(err: neo4rs::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Colaborador de almacenamiento y búsqueda vectorial.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Crea (o valida) el índice para vectores de dimensión `dim`.
    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorIndexError>;

    /// Guarda un punto por vector con su payload.
    async fn upsert(&self, vectors: Vec<Vec<f64>>, payloads: Vec<Chunk>) -> Result<(), VectorIndexError>;

    /// Hits de la sesión ordenados por similitud descendente.
    async fn search(&self, vector: &[f64], k: usize, session_id: &str) -> Result<Vec<Hit>, VectorIndexError>;

    /// Borra todos los chunks de la sesión y devuelve cuántos había.
    async fn delete_by_session(&self, session_id: &str) -> Result<usize, VectorIndexError>;
}

/// Índice vectorial sobre nodos `:Chunk` de Neo4j.
#[derive(Clone)]
pub struct Neo4jVectorIndex {
    graph: Arc<Graph>,
}

impl Neo4jVectorIndex {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl VectorIndex for Neo4jVectorIndex {
    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorIndexError> {
        // ¿Ya existe el índice? Usamos la sintaxis moderna SHOW VECTOR INDEXES.
        let mut cursor = self
            .graph
            .execute(
                query(
                    "SHOW VECTOR INDEXES YIELD name, options WHERE name = $name
                     RETURN options.indexConfig['vector.dimensions'] AS dims",
                )
                .param("name", CHUNK_INDEX_NAME),
            )
            .await?;

        if let Some(row) = cursor.next().await? {
            let actual: i64 = row.get("dims").ok_or(VectorIndexError::MissingField("dims"))?;
            if actual as usize != dim {
                return Err(VectorIndexError::DimensionMismatch {
                    index: CHUNK_INDEX_NAME.to_string(),
                    expected: dim,
                    actual: actual as usize,
                });
            }
            info!("Índice vectorial '{CHUNK_INDEX_NAME}' ya existe ({dim} dimensiones).");
            return Ok(());
        }

        let cypher = format!(
            "\
CREATE VECTOR INDEX {CHUNK_INDEX_NAME} IF NOT EXISTS
FOR (c:Chunk)
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dim},
    `vector.similarity_function`: 'cosine'
  }}
}}"
        );
        self.graph.run(query(&cypher)).await?;
        info!("Índice vectorial '{CHUNK_INDEX_NAME}' creado ({dim} dimensiones).");
        Ok(())
    }

    async fn upsert(&self, vectors: Vec<Vec<f64>>, payloads: Vec<Chunk>) -> Result<(), VectorIndexError> {
        if vectors.len() != payloads.len() {
            return Err(VectorIndexError::LengthMismatch {
                vectors: vectors.len(),
                payloads: payloads.len(),
            });
        }

        let created_at = Utc::now().to_rfc3339();
        let tx = self.graph.start_txn().await?;
        for (vector, chunk) in vectors.into_iter().zip(payloads) {
            tx.run(
                query(
                    "CREATE (c:Chunk {id: $id})
                     SET c.text = $text, c.source = $source, c.file_type = $file_type,
                         c.chunk_id = $chunk_id, c.session_id = $session_id,
                         c.embedding = $embedding, c.created_at = datetime($created_at)",
                )
                .param("id", Uuid::new_v4().to_string())
                .param("text", chunk.text)
                .param("source", chunk.source)
                .param("file_type", chunk.file_type.as_str())
                .param("chunk_id", chunk.chunk_id)
                .param("session_id", chunk.session_id)
                .param("embedding", vector)
                .param("created_at", created_at.clone()),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, vector: &[f64], k: usize, session_id: &str) -> Result<Vec<Hit>, VectorIndexError> {
        // Se deshace el reescalado para que MIN_SIM trabaje sobre el coseno
        let mut cursor = self
            .graph
            .execute(
                query(SESSION_SEARCH_CYPHER)
                .param("embedding", vector.to_vec())
                .param("session_id", session_id)
                .param("k", k as i64),
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = cursor.next().await? {
            let text: String = row.get("text").ok_or(VectorIndexError::MissingField("text"))?;
            let source: String = row.get("source").unwrap_or_else(|| "unknown".to_string());
            let file_type: String = row.get("file_type").unwrap_or_default();
            let chunk_id: i64 = row.get("chunk_id").unwrap_or_default();
            let session_id: String = row
                .get("session_id")
                .ok_or(VectorIndexError::MissingField("session_id"))?;
            let score: f64 = row.get("score").ok_or(VectorIndexError::MissingField("score"))?;

            hits.push(Hit {
                chunk: Chunk {
                    text,
                    source,
                    file_type: FileType::parse(&file_type),
                    chunk_id,
                    session_id,
                },
                score,
            });
        }
        Ok(hits)
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<usize, VectorIndexError> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (c:Chunk {session_id: $session_id})
                     WITH collect(c) AS chunks
                     FOREACH (c IN chunks | DETACH DELETE c)
                     RETURN size(chunks) AS deleted",
                )
                .param("session_id", session_id),
            )
            .await?;

        let deleted: i64 = match cursor.next().await? {
            Some(row) => row.get("deleted").unwrap_or_default(),
            None => 0,
        };
        info!("Sesión '{session_id}' purgada: {deleted} chunks eliminados.");
        Ok(deleted as usize)
    }
}

/// Índice en memoria con búsqueda exhaustiva por coseno, para tests.
#[cfg(test)]
pub mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryVectorIndex {
        points: RwLock<Vec<(Vec<f64>, Chunk)>>,
        searches: AtomicUsize,
    }

    impl InMemoryVectorIndex {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn point_count(&self, session_id: &str) -> usize {
            self.points
                .read()
                .unwrap()
                .iter()
                .filter(|(_, c)| c.session_id == session_id)
                .count()
        }

        pub fn chunks(&self, session_id: &str) -> Vec<Chunk> {
            self.points
                .read()
                .unwrap()
                .iter()
                .filter(|(_, c)| c.session_id == session_id)
                .map(|(_, c)| c.clone())
                .collect()
        }

        pub fn search_calls(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    fn cosine(a: &[f64], b: &[f64]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    #[async_trait]
    impl VectorIndex for InMemoryVectorIndex {
        async fn ensure_collection(&self, _dim: usize) -> Result<(), VectorIndexError> {
            Ok(())
        }

        async fn upsert(&self, vectors: Vec<Vec<f64>>, payloads: Vec<Chunk>) -> Result<(), VectorIndexError> {
            if vectors.len() != payloads.len() {
                return Err(VectorIndexError::LengthMismatch {
                    vectors: vectors.len(),
                    payloads: payloads.len(),
                });
            }
            self.points
                .write()
                .unwrap()
                .extend(vectors.into_iter().zip(payloads));
            Ok(())
        }

        async fn search(&self, vector: &[f64], k: usize, session_id: &str) -> Result<Vec<Hit>, VectorIndexError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            let mut hits: Vec<Hit> = self
                .points
                .read()
                .unwrap()
                .iter()
                .filter(|(_, c)| c.session_id == session_id)
                .map(|(v, c)| Hit {
                    chunk: c.clone(),
                    score: cosine(vector, v),
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(k);
            Ok(hits)
        }

        async fn delete_by_session(&self, session_id: &str) -> Result<usize, VectorIndexError> {
            let mut points = self.points.write().unwrap();
            let before = points.len();
            points.retain(|(_, c)| c.session_id != session_id);
            Ok(before - points.len())
        }
    }

    mod tests {
        use super::*;

        fn chunk(session: &str, text: &str) -> Chunk {
            Chunk {
                text: text.to_string(),
                source: "doc.txt".to_string(),
                file_type: FileType::Txt,
                chunk_id: 0,
                session_id: session.to_string(),
            }
        }

        #[tokio::test]
        async fn search_is_scoped_to_session_and_sorted() {
            let index = InMemoryVectorIndex::new();
            index
                .upsert(
                    vec![vec![1.0, 0.0], vec![0.6, 0.8], vec![1.0, 0.0]],
                    vec![chunk("a", "x"), chunk("a", "y"), chunk("b", "z")],
                )
                .await
                .unwrap();

            let hits = index.search(&[1.0, 0.0], 10, "a").await.unwrap();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].text(), "x");
            assert!(hits[0].score > hits[1].score);
        }

        #[tokio::test]
        async fn crowded_neighbour_sessions_do_not_hide_a_small_one() {
            let index = InMemoryVectorIndex::new();
            let crowd = 200;
            index
                .upsert(
                    vec![vec![1.0, 0.0]; crowd],
                    (0..crowd).map(|i| chunk("b", &format!("b{i}"))).collect(),
                )
                .await
                .unwrap();
            index
                .upsert(vec![vec![0.2, 1.0]], vec![chunk("a", "Cena biletu wynosi 50 zł.")])
                .await
                .unwrap();

            let hits = index.search(&[1.0, 0.0], 8, "a").await.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].text(), "Cena biletu wynosi 50 zł.");
        }

        #[tokio::test]
        async fn delete_only_touches_one_session() {
            let index = InMemoryVectorIndex::new();
            index
                .upsert(vec![vec![1.0], vec![1.0]], vec![chunk("a", "x"), chunk("b", "y")])
                .await
                .unwrap();
            assert_eq!(index.delete_by_session("a").await.unwrap(), 1);
            assert_eq!(index.point_count("a"), 0);
            assert_eq!(index.point_count("b"), 1);
        }

        #[tokio::test]
        async fn mismatched_upsert_is_rejected() {
            let index = InMemoryVectorIndex::new();
            let err = index.upsert(vec![vec![1.0]], vec![]).await.unwrap_err();
            assert!(matches!(err, VectorIndexError::LengthMismatch { vectors: 1, payloads: 0 }));
        }
    }
}
