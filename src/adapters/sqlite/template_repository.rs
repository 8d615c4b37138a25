//! SQLite implementation of the TemplateRepository.
//!
//! Embeddings are stored as little-endian f32 blobs. Nearest-neighbor
//! lookup loads all templates and ranks by cosine similarity in process;
//! the seeded corpus is small enough that an index would buy nothing.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{cosine_similarity, StackTemplate};
use crate::domain::ports::TemplateRepository;

#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    title: String,
    backend: String,
    frontend: String,
    database: String,
    description: String,
    embedding: Option<Vec<u8>>,
}

impl TryFrom<TemplateRow> for StackTemplate {
    type Error = OrchestratorError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(StackTemplate {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrchestratorError::Internal(format!("bad template id: {e}")))?,
            title: row.title,
            backend: row.backend,
            frontend: row.frontend,
            database: row.database,
            description: row.description,
            embedding: row.embedding.as_deref().map(blob_to_embedding),
        })
    }
}

#[async_trait]
impl TemplateRepository for SqliteTemplateRepository {
    async fn upsert(&self, template: &StackTemplate) -> DomainResult<()> {
        let blob = template.embedding.as_deref().map(embedding_to_blob);

        // Keyed by title so re-seeding stays idempotent. An update that
        // carries no embedding keeps the stored one.
        let updated = sqlx::query(
            "UPDATE stack_templates SET backend = ?, frontend = ?, database = ?,
             description = ?, embedding = COALESCE(?, embedding)
             WHERE title = ?",
        )
        .bind(&template.backend)
        .bind(&template.frontend)
        .bind(&template.database)
        .bind(&template.description)
        .bind(blob.clone())
        .bind(&template.title)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO stack_templates (id, title, backend, frontend, database, description, embedding)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(template.id.to_string())
            .bind(&template.title)
            .bind(&template.backend)
            .bind(&template.frontend)
            .bind(&template.database)
            .bind(&template.description)
            .bind(blob)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<StackTemplate>> {
        let rows: Vec<TemplateRow> =
            sqlx::query_as("SELECT * FROM stack_templates ORDER BY title ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(StackTemplate::try_from).collect()
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> DomainResult<Vec<(StackTemplate, f64)>> {
        let templates = self.list().await?;

        let mut scored: Vec<(StackTemplate, f64)> = templates
            .into_iter()
            .filter_map(|t| {
                let sim = t
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(e, embedding))?;
                Some((t, sim))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
