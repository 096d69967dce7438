use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{info, warn};

use crate::embeddings::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{IndexingError, SearchError};
use crate::models::{Chunk, IndexedChunk, ScoredChunk};
use crate::traits::VectorIndex;

pub const DATABASE_FILE: &str = "index.sqlite";

// Concurrent writers on the same file wait for SQLite's lock up to this long.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Vector index kept in a SQLite file under the store root. Search is a
/// brute-force cosine scan in insertion order.
pub struct LocalVectorStore {
    pool: SqlitePool,
}

impl LocalVectorStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, IndexingError> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| IndexingError::Io {
                path: root.to_path_buf(),
                source,
            })?;

        let path = root.join(DATABASE_FILE);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                model TEXT NOT NULL,
                ingested_at INTEGER NOT NULL,
                source_page INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!(path = %path.display(), "opened vector store");
        Ok(Self { pool })
    }

    pub async fn len(&self) -> Result<usize, IndexingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn add(&self, records: Vec<IndexedChunk>) -> Result<usize, IndexingError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, model, ingested_at, source_page,
                                    chunk_index, text, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.id.to_string())
            .bind(&record.document_id)
            .bind(&record.model)
            .bind(record.ingested_at.timestamp_millis())
            .bind(i64::from(record.chunk.source_page))
            .bind(record.chunk.chunk_index as i64)
            .bind(&record.chunk.text)
            .bind(record.embedding.len() as i64)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(written = records.len(), "appended records to vector store");
        Ok(records.len())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let rows = sqlx::query(
            "SELECT source_page, chunk_index, text, dims, embedding FROM chunks ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut skipped = 0usize;
        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let dims: i64 = row.try_get("dims")?;
            if dims as usize != query_vector.len() {
                skipped += 1;
                continue;
            }
            let blob: Vec<u8> = row.try_get("embedding")?;
            let source_page: i64 = row.try_get("source_page")?;
            let chunk_index: i64 = row.try_get("chunk_index")?;
            scored.push(ScoredChunk {
                score: cosine_similarity(query_vector, &blob_to_vec(&blob)),
                chunk: Chunk {
                    text: row.try_get("text")?,
                    source_page: source_page as u32,
                    chunk_index: chunk_index as u64,
                },
            });
        }

        if skipped > 0 {
            warn!(
                skipped,
                expected_dimensions = query_vector.len(),
                "skipped records embedded with a different dimension"
            );
        }

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
