//! SQLite backend for knowledge chunks and session memory.
//!
//! Two tables:
//! - `knowledge_chunks`: one row per chunk, embeddings as little-endian f32 blobs
//! - `session_memory`: one row per conversation with an optimistic `version`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ragline_core::chunk::{ChunkType, KnowledgeChunk, TenantId};
use ragline_core::error::StoreError;
use ragline_core::message::{ConversationId, SessionMemory};
use ragline_core::store::{KnowledgeStore, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite store implementing both `KnowledgeStore` and `SessionStore`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to `:memory:` is a separate database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_chunks (
                iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT UNIQUE NOT NULL,
                tenant_id      TEXT NOT NULL,
                chunk_type     TEXT NOT NULL,
                source_id      TEXT,
                document_id    TEXT,
                section_title  TEXT NOT NULL,
                full_text      TEXT NOT NULL,
                tldr           TEXT NOT NULL,
                tldr_embedding BLOB,
                full_embedding BLOB,
                language       TEXT NOT NULL,
                word_count     INTEGER NOT NULL,
                metadata       TEXT NOT NULL DEFAULT '{}',
                created_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge_chunks table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_source \
             ON knowledge_chunks(tenant_id, chunk_type, source_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("source index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_recent \
             ON knowledge_chunks(tenant_id, chunk_type, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("recent index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_memory (
                conversation_id    TEXT PRIMARY KEY,
                tenant_id          TEXT NOT NULL,
                cumulative_summary TEXT NOT NULL DEFAULT '',
                message_count      INTEGER NOT NULL DEFAULT 0,
                version            INTEGER NOT NULL DEFAULT 0,
                updated_at         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("session_memory table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn timestamp(ts: &DateTime<Utc>) -> String {
        // Fixed width so that text ordering matches time ordering.
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Option<Vec<u8>> {
        if embedding.is_empty() {
            return None;
        }
        Some(embedding.iter().flat_map(|f| f.to_le_bytes()).collect())
    }

    fn blob_to_embedding(blob: Option<Vec<u8>>) -> Vec<f32> {
        blob.map(|b| {
            b.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
        .unwrap_or_default()
    }

    fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeChunk, StoreError> {
        let chunk_type: String = Self::column(row, "chunk_type")?;
        let chunk_type = ChunkType::from_str(&chunk_type).map_err(StoreError::QueryFailed)?;
        let metadata: String = Self::column(row, "metadata")?;
        let created_at: String = Self::column(row, "created_at")?;
        let word_count: i64 = Self::column(row, "word_count")?;

        Ok(KnowledgeChunk {
            id: Self::column(row, "id")?,
            tenant_id: TenantId(Self::column(row, "tenant_id")?),
            chunk_type,
            source_id: Self::column(row, "source_id")?,
            document_id: Self::column(row, "document_id")?,
            section_title: Self::column(row, "section_title")?,
            full_text: Self::column(row, "full_text")?,
            tldr: Self::column(row, "tldr")?,
            tldr_embedding: Self::blob_to_embedding(Self::column(row, "tldr_embedding")?),
            full_embedding: Self::blob_to_embedding(Self::column(row, "full_embedding")?),
            language: Self::column(row, "language")?,
            word_count: word_count.max(0) as usize,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<SessionMemory, StoreError> {
        let message_count: i64 = Self::column(row, "message_count")?;
        let version: i64 = Self::column(row, "version")?;
        let updated_at: String = Self::column(row, "updated_at")?;
        Ok(SessionMemory {
            conversation_id: ConversationId(Self::column(row, "conversation_id")?),
            tenant_id: TenantId(Self::column(row, "tenant_id")?),
            cumulative_summary: Self::column(row, "cumulative_summary")?,
            message_count: message_count.max(0) as usize,
            version: version.max(0) as u64,
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    async fn fetch_chunks(
        &self,
        sql: &str,
        tenant: &TenantId,
        chunk_type: ChunkType,
        extra: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let mut query = sqlx::query(sql).bind(tenant.as_str()).bind(chunk_type.as_str());
        if let Some(extra) = extra {
            query = query.bind(extra);
        }
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_chunk).collect()
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, chunk: KnowledgeChunk) -> Result<String, StoreError> {
        let metadata = serde_json::to_string(&chunk.metadata)
            .map_err(|e| StoreError::Storage(format!("metadata: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_chunks (
                id, tenant_id, chunk_type, source_id, document_id, section_title,
                full_text, tldr, tldr_embedding, full_embedding, language,
                word_count, metadata, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&chunk.id)
        .bind(chunk.tenant_id.as_str())
        .bind(chunk.chunk_type.as_str())
        .bind(chunk.source_id.as_deref())
        .bind(chunk.document_id.as_deref())
        .bind(&chunk.section_title)
        .bind(&chunk.full_text)
        .bind(&chunk.tldr)
        .bind(Self::embedding_to_blob(&chunk.tldr_embedding))
        .bind(Self::embedding_to_blob(&chunk.full_embedding))
        .bind(&chunk.language)
        .bind(chunk.word_count as i64)
        .bind(metadata)
        .bind(Self::timestamp(&chunk.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert chunk: {e}")))?;

        Ok(chunk.id)
    }

    async fn delete_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "DELETE FROM knowledge_chunks WHERE tenant_id = ?1 AND chunk_type = ?2 AND source_id = ?3",
        )
        .bind(tenant.as_str())
        .bind(chunk_type.as_str())
        .bind(source_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("delete source: {e}")))?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_type(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
    ) -> Result<usize, StoreError> {
        let result =
            sqlx::query("DELETE FROM knowledge_chunks WHERE tenant_id = ?1 AND chunk_type = ?2")
                .bind(tenant.as_str())
                .bind(chunk_type.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("delete type: {e}")))?;
        Ok(result.rows_affected() as usize)
    }

    async fn list(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        self.fetch_chunks(
            "SELECT * FROM knowledge_chunks WHERE tenant_id = ?1 AND chunk_type = ?2 ORDER BY iid",
            tenant,
            chunk_type,
            None,
            None,
        )
        .await
    }

    async fn list_source(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        source_id: &str,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        self.fetch_chunks(
            "SELECT * FROM knowledge_chunks \
             WHERE tenant_id = ?1 AND chunk_type = ?2 AND source_id = ?3 ORDER BY iid",
            tenant,
            chunk_type,
            Some(source_id),
            None,
        )
        .await
    }

    async fn recent(
        &self,
        tenant: &TenantId,
        chunk_type: ChunkType,
        limit: usize,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        self.fetch_chunks(
            "SELECT * FROM knowledge_chunks WHERE tenant_id = ?1 AND chunk_type = ?2 \
             ORDER BY created_at DESC, iid DESC LIMIT ?3",
            tenant,
            chunk_type,
            None,
            Some(limit),
        )
        .await
    }

    async fn count(
        &self,
        tenant: &TenantId,
        chunk_type: Option<ChunkType>,
    ) -> Result<usize, StoreError> {
        let row = match chunk_type {
            Some(t) => {
                sqlx::query(
                    "SELECT COUNT(*) AS n FROM knowledge_chunks WHERE tenant_id = ?1 AND chunk_type = ?2",
                )
                .bind(tenant.as_str())
                .bind(t.as_str())
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM knowledge_chunks WHERE tenant_id = ?1")
                    .bind(tenant.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::QueryFailed(format!("count: {e}")))?;

        let n: i64 = Self::column(&row, "n")?;
        Ok(n.max(0) as usize)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create(
        &self,
        conversation: &ConversationId,
        tenant: &TenantId,
    ) -> Result<SessionMemory, StoreError> {
        sqlx::query(
            "INSERT INTO session_memory (conversation_id, tenant_id, updated_at) \
             VALUES (?1, ?2, ?3) ON CONFLICT(conversation_id) DO NOTHING",
        )
        .bind(&conversation.0)
        .bind(tenant.as_str())
        .bind(Self::timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("create session memory: {e}")))?;

        self.get(conversation)
            .await?
            .ok_or_else(|| StoreError::NotFound(conversation.to_string()))
    }

    async fn get(&self, conversation: &ConversationId) -> Result<Option<SessionMemory>, StoreError> {
        let row = sqlx::query("SELECT * FROM session_memory WHERE conversation_id = ?1")
            .bind(&conversation.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get session memory: {e}")))?;
        row.as_ref().map(Self::row_to_memory).transpose()
    }

    async fn save(&self, mut memory: SessionMemory) -> Result<SessionMemory, StoreError> {
        let now = Utc::now();
        let next_version = memory.version + 1;

        let result = sqlx::query(
            r#"
            INSERT INTO session_memory
                (conversation_id, tenant_id, cumulative_summary, message_count, version, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(conversation_id) DO UPDATE SET
                cumulative_summary = excluded.cumulative_summary,
                message_count = excluded.message_count,
                version = excluded.version,
                updated_at = excluded.updated_at
            WHERE session_memory.version = ?7
            "#,
        )
        .bind(&memory.conversation_id.0)
        .bind(memory.tenant_id.as_str())
        .bind(&memory.cumulative_summary)
        .bind(memory.message_count as i64)
        .bind(next_version as i64)
        .bind(Self::timestamp(&now))
        .bind(memory.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("save session memory: {e}")))?;

        if result.rows_affected() == 0 {
            let found = self
                .get(&memory.conversation_id)
                .await?
                .map(|m| m.version)
                .unwrap_or(0);
            return Err(StoreError::Conflict {
                key: memory.conversation_id.to_string(),
                expected: memory.version,
                found,
            });
        }

        memory.version = next_version;
        memory.updated_at = now;
        Ok(memory)
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM session_memory WHERE conversation_id = ?1")
            .bind(&conversation.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("clear session memory: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::testing::chunk;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn tenant() -> TenantId {
        TenantId::from("shop_1")
    }

    #[tokio::test]
    async fn insert_and_list_roundtrip() {
        let db = test_store().await;
        let mut c = chunk("shop_1", ChunkType::Website, "About", "We sell shoes since 1990");
        c.tldr_embedding = vec![0.5, -0.25];
        c.document_id = Some("doc-1".into());
        c.metadata.insert("content_hash".into(), "abc".into());
        db.insert(c.clone()).await.unwrap();

        let listed = db.list(&tenant(), ChunkType::Website).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, c.id);
        assert_eq!(listed[0].tldr_embedding, vec![0.5, -0.25]);
        assert!(listed[0].full_embedding.is_empty());
        assert_eq!(listed[0].content_hash(), Some("abc"));
        assert_eq!(listed[0].document_id.as_deref(), Some("doc-1"));
    }

    #[tokio::test]
    async fn delete_source_and_count() {
        let db = test_store().await;
        db.insert(chunk("shop_1", ChunkType::Faq, "f1", "a")).await.unwrap();
        db.insert(chunk("shop_1", ChunkType::Faq, "f2", "b")).await.unwrap();
        db.insert(chunk("shop_1", ChunkType::Product, "p1", "c")).await.unwrap();

        assert_eq!(db.delete_source(&tenant(), ChunkType::Faq, "f1").await.unwrap(), 1);
        assert_eq!(db.count(&tenant(), Some(ChunkType::Faq)).await.unwrap(), 1);
        assert_eq!(db.count(&tenant(), None).await.unwrap(), 2);
        assert_eq!(db.delete_type(&tenant(), ChunkType::Product).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_orders_newest_first() {
        let db = test_store().await;
        for title in ["old", "mid", "new"] {
            db.insert(chunk("shop_1", ChunkType::Faq, title, title)).await.unwrap();
        }
        let recent = db.recent(&tenant(), ChunkType::Faq, 2).await.unwrap();
        assert_eq!(recent[0].section_title, "new");
        assert_eq!(recent[1].section_title, "mid");
    }

    #[tokio::test]
    async fn session_optimistic_versioning() {
        let db = test_store().await;
        let conv = ConversationId::from("conv_1");
        let mem = db.get_or_create(&conv, &tenant()).await.unwrap();
        assert_eq!(mem.version, 0);

        let mut first = mem.clone();
        first.replace_summary("summary one".into(), 5);
        let saved = db.save(first).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut stale = mem;
        stale.replace_summary("stale".into(), 5);
        let err = db.save(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }));

        let stored = db.get(&conv).await.unwrap().unwrap();
        assert_eq!(stored.cumulative_summary, "summary one");
        assert_eq!(stored.message_count, 5);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_and_clear_works() {
        let db = test_store().await;
        let conv = ConversationId::from("conv_2");
        db.get_or_create(&conv, &tenant()).await.unwrap();
        db.get_or_create(&conv, &tenant()).await.unwrap();
        assert!(db.clear(&conv).await.unwrap());
        assert!(db.get(&conv).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("ragline.db").display());
        {
            let db = SqliteStore::new(&path).await.unwrap();
            db.insert(chunk("shop_1", ChunkType::Faq, "f1", "hello")).await.unwrap();
        }
        let db = SqliteStore::new(&path).await.unwrap();
        assert_eq!(db.count(&tenant(), None).await.unwrap(), 1);
    }
}
