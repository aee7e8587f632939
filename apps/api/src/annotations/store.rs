use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::annotations::models::{
    Annotation, AnnotationFilter, AnnotationPatch, AnnotationStatus, PageWindow, Patch,
};
pub use crate::db::StoreError;
use crate::models::annotation::{AnnotationRow, StatusCountRow};

/// Persistence for annotation records.
///
/// Writes are last-write-wins; there is no optimistic concurrency token.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    async fn insert(&self, annotation: &Annotation) -> Result<(), StoreError>;

    /// Persists the pipeline-owned fields (text, body, genre, status, error, updated_at).
    async fn save_outcome(&self, annotation: &Annotation) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Annotation>, StoreError>;

    /// Applies a partial update. Returns `None` when no record matched.
    async fn update(
        &self,
        id: Uuid,
        patch: AnnotationPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError>;

    /// Returns `None` when no record matched.
    async fn set_tts_url(
        &self,
        id: Uuid,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError>;

    /// Removes the record and returns it, or `None` when nothing matched.
    async fn delete(&self, id: Uuid) -> Result<Option<Annotation>, StoreError>;

    /// Newest first.
    async fn list(
        &self,
        filter: &AnnotationFilter,
        window: PageWindow,
    ) -> Result<Vec<Annotation>, StoreError>;

    async fn count_by_status(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<(AnnotationStatus, i64)>, StoreError>;
}

fn into_domain(row: AnnotationRow) -> Result<Annotation, StoreError> {
    Annotation::try_from(row).map_err(StoreError::Corrupt)
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgAnnotationStore {
    pool: PgPool,
}

impl PgAnnotationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnotationStore for PgAnnotationStore {
    async fn insert(&self, a: &Annotation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO annotations
                (id, owner_id, title, image, source_type, text_content, annotation,
                 genre, tts_url, status, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(a.id)
        .bind(a.owner_id)
        .bind(&a.title)
        .bind(&a.image)
        .bind(&a.source_type)
        .bind(&a.text_content)
        .bind(&a.annotation)
        .bind(&a.genre)
        .bind(&a.tts_url)
        .bind(a.status.as_str())
        .bind(&a.error_message)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_outcome(&self, a: &Annotation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE annotations
            SET text_content = $2, annotation = $3, genre = $4,
                status = $5, error_message = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(a.id)
        .bind(&a.text_content)
        .bind(&a.annotation)
        .bind(&a.genre)
        .bind(a.status.as_str())
        .bind(&a.error_message)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Annotation>, StoreError> {
        sqlx::query_as::<_, AnnotationRow>("SELECT * FROM annotations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_domain)
            .transpose()
    }

    async fn update(
        &self,
        id: Uuid,
        patch: AnnotationPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError> {
        let (image_set, image) = match patch.image {
            Patch::Set(value) => (true, value),
            Patch::Unset => (false, None),
        };

        sqlx::query_as::<_, AnnotationRow>(
            r#"
            UPDATE annotations
            SET title = COALESCE($2, title),
                image = CASE WHEN $3 THEN $4 ELSE image END,
                annotation = COALESCE($5, annotation),
                genre = COALESCE($6, genre),
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.title.as_set())
        .bind(image_set)
        .bind(image)
        .bind(patch.annotation.as_set())
        .bind(patch.genre.as_set())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(into_domain)
        .transpose()
    }

    async fn set_tts_url(
        &self,
        id: Uuid,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError> {
        sqlx::query_as::<_, AnnotationRow>(
            "UPDATE annotations SET tts_url = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(into_domain)
        .transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Annotation>, StoreError> {
        sqlx::query_as::<_, AnnotationRow>("DELETE FROM annotations WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_domain)
            .transpose()
    }

    async fn list(
        &self,
        filter: &AnnotationFilter,
        window: PageWindow,
    ) -> Result<Vec<Annotation>, StoreError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM annotations WHERE TRUE");
        if let Some(owner) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(genre) = &filter.genre {
            query.push(" AND genre = ").push_bind(genre.clone());
        }
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(window.limit)
            .push(" OFFSET ")
            .push_bind(window.offset);

        query
            .build_query_as::<AnnotationRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_domain)
            .collect()
    }

    async fn count_by_status(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<(AnnotationStatus, i64)>, StoreError> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM annotations
            WHERE owner_id = $1
            GROUP BY status
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                r.status
                    .parse::<AnnotationStatus>()
                    .map(|s| (s, r.count))
                    .map_err(StoreError::Corrupt)
            })
            .collect()
    }
}
