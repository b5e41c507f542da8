//! SQLite storage for documents and their highlights
//!
//! The in-memory document store is authoritative while the server runs;
//! this repository is the durable copy it saves into and loads from at
//! startup.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::schema::initialize_schema;
use super::types::{Document, Highlight, HighlightOrigin, Rect};

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Durable storage for documents
#[async_trait]
pub trait DocumentPersistence: Send + Sync {
    /// Load every stored document with its highlights
    async fn load_all(&self) -> Result<Vec<Document>, StoreError>;

    /// Replace the stored copy of a document and its highlight set
    async fn save(&self, document: &Document) -> Result<(), StoreError>;

    /// Remove a document and its highlights
    async fn delete(&self, document_id: &str) -> Result<(), StoreError>;
}

/// SQLite-backed document repository
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (creating if missing) a database file and initialize the schema
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        initialize_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Private in-memory database, kept on a single long-lived connection
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        initialize_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Count stored highlights for a document
    pub async fn count_highlights(&self, document_id: &str) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM highlights WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    async fn load_highlights(&self, document_id: &str) -> Result<Vec<Highlight>, StoreError> {
        let rows = sqlx::query_as::<_, HighlightRow>(
            r#"
            SELECT id, page_index, rects_json, color, note, origin, score,
                   extracted_text, run_id, created_at, updated_at
            FROM highlights
            WHERE document_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HighlightRow::into_highlight).collect()
    }
}

#[async_trait]
impl DocumentPersistence for SqliteDocumentStore {
    async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, filename, pdf_path, page_count, global_profile, document_goal,
                   density_target, version, created_at, updated_at
            FROM documents
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let highlights = self.load_highlights(&row.id).await?;
            documents.push(row.into_document(highlights)?);
        }

        Ok(documents)
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, filename, pdf_path, page_count, global_profile, document_goal,
                density_target, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                pdf_path = excluded.pdf_path,
                page_count = excluded.page_count,
                global_profile = excluded.global_profile,
                document_goal = excluded.document_goal,
                density_target = excluded.density_target,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.id)
        .bind(&document.filename)
        .bind(&document.pdf_path)
        .bind(document.page_count.map(i64::from))
        .bind(&document.global_profile)
        .bind(&document.document_goal)
        .bind(f64::from(document.density_target))
        .bind(i64::from(document.version))
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM highlights WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for (position, highlight) in document.highlights.iter().enumerate() {
            let rects_json = serde_json::to_string(&highlight.rects)?;

            sqlx::query(
                r#"
                INSERT INTO highlights (
                    id, document_id, position, page_index, rects_json, color, note,
                    origin, score, extracted_text, run_id, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&highlight.id)
            .bind(&document.id)
            .bind(position as i64)
            .bind(i64::from(highlight.page_index))
            .bind(&rects_json)
            .bind(&highlight.color)
            .bind(&highlight.note)
            .bind(highlight.origin.as_str())
            .bind(highlight.score.map(f64::from))
            .bind(&highlight.extracted_text)
            .bind(&highlight.run_id)
            .bind(highlight.created_at.to_rfc3339())
            .bind(highlight.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Internal row type for document queries
#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    filename: String,
    pdf_path: String,
    page_count: Option<i64>,
    global_profile: Option<String>,
    document_goal: Option<String>,
    density_target: f64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn into_document(self, highlights: Vec<Highlight>) -> Result<Document, StoreError> {
        Ok(Document {
            id: self.id,
            filename: self.filename,
            pdf_path: self.pdf_path,
            page_count: self.page_count.map(|n| n.max(0) as u32),
            highlights,
            global_profile: self.global_profile,
            document_goal: self.document_goal,
            density_target: self.density_target as f32,
            version: self.version.max(1) as u32,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Internal row type for highlight queries
#[derive(sqlx::FromRow)]
struct HighlightRow {
    id: String,
    page_index: i64,
    rects_json: String,
    color: String,
    note: Option<String>,
    origin: String,
    score: Option<f64>,
    extracted_text: Option<String>,
    run_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl HighlightRow {
    fn into_highlight(self) -> Result<Highlight, StoreError> {
        let rects: Vec<Rect> = serde_json::from_str(&self.rects_json)?;

        Ok(Highlight {
            id: self.id,
            page_index: self.page_index.max(0) as u32,
            rects,
            color: self.color,
            note: self.note,
            origin: HighlightOrigin::parse(&self.origin),
            score: self.score.map(|s| s as f32),
            extracted_text: self.extracted_text,
            run_id: self.run_id,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        let mut doc = Document::new("report.pdf", "/data/report.pdf");
        doc.page_count = Some(3);
        doc.global_profile = Some("Investor".to_string());
        doc.document_goal = Some("GPU growth".to_string());
        doc.add_highlight(Highlight::manual(
            0,
            vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
            Some("first".to_string()),
        ));
        doc.add_highlight(Highlight::auto_generated(
            "run-1",
            2,
            vec![Rect::new(1.0, 2.0, 3.0, 4.0), Rect::new(1.0, 5.0, 3.0, 7.0)],
            0.9,
            Some("GPU Roadmap".to_string()),
            "The roadmap outlines GPUs",
        ));
        doc
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let doc = sample_document();

        store.save(&doc).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert_eq!(loaded.id, doc.id);
        assert_eq!(loaded.page_count, Some(3));
        assert_eq!(loaded.highlights.len(), 2);
        assert_eq!(loaded.highlights[0].note.as_deref(), Some("first"));
        assert_eq!(loaded.highlights[1].origin, HighlightOrigin::AutoGenerated);
        assert_eq!(loaded.highlights[1].rects.len(), 2);
        assert_eq!(loaded.highlights[1].run_id.as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn test_save_replaces_highlight_set() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let mut doc = sample_document();
        store.save(&doc).await.unwrap();
        assert_eq!(store.count_highlights(&doc.id).await.unwrap(), 2);

        doc.clear_highlights();
        store.save(&doc).await.unwrap();
        assert_eq!(store.count_highlights(&doc.id).await.unwrap(), 0);

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].highlights.is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_highlights() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let doc = sample_document();
        store.save(&doc).await.unwrap();

        store.delete(&doc.id).await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
        assert_eq!(store.count_highlights(&doc.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("copilot.db").display());
        let doc = sample_document();

        {
            let store = SqliteDocumentStore::connect(&url).await.unwrap();
            store.save(&doc).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteDocumentStore::connect(&url).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].highlights.len(), 2);
    }
}
