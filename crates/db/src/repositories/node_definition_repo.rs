//! Repository for the `node_definitions` table.

use flowsmith_core::definition::{DefinitionStatus, NewIoDefinition};
use flowsmith_core::store::{DefinitionFields, DefinitionFilter, DefinitionRecord, VersionBump};
use flowsmith_core::types::DbId;
use sqlx::PgPool;

use super::io_definition_repo::IoDefinitionRepo;
use super::PgTransaction;
use crate::models::node_definition::NodeDefinitionRow;

/// Column list for node_definitions queries.
const COLUMNS: &str = "id, kind, slug, name, description, icon, color, version, status, \
    config_schema, pricing, archived_at, created_at, updated_at";

pub struct NodeDefinitionRepo;

impl NodeDefinitionRepo {
    /// Insert a definition and its IO rows in one transaction.
    pub async fn create(
        pool: &PgPool,
        record: &DefinitionRecord,
        io: &[NewIoDefinition],
    ) -> Result<NodeDefinitionRow, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let row = Self::insert_inner(&mut tx, record).await?;
        IoDefinitionRepo::insert_all_inner(&mut tx, row.id, io).await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<NodeDefinitionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM node_definitions WHERE id = $1");
        sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_ids(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<NodeDefinitionRow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM node_definitions WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    pub async fn find_active_by_slug(
        pool: &PgPool,
        slug: &str,
    ) -> Result<Option<NodeDefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM node_definitions \
             WHERE slug = $1 AND status = 'active' \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        filter: &DefinitionFilter,
    ) -> Result<Vec<NodeDefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM node_definitions \
             WHERE ($1::TEXT IS NULL OR kind = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY id \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Whether a draft or active row other than `excluding` uses `slug`.
    pub async fn slug_in_use(
        pool: &PgPool,
        slug: &str,
        excluding: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                SELECT 1 FROM node_definitions \
                WHERE slug = $1 AND status IN ('draft', 'active') \
                  AND ($2::BIGINT IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(excluding)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Apply whitelisted fields, optionally swapping the IO set, in one
    /// transaction. Returns `None` if the row does not exist or its status
    /// is no longer `expected_status`.
    pub async fn update_in_place(
        pool: &PgPool,
        id: DbId,
        expected_status: DefinitionStatus,
        fields: &DefinitionFields,
        replace_io: Option<&[NewIoDefinition]>,
    ) -> Result<Option<NodeDefinitionRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE node_definitions SET \
                slug = COALESCE($2, slug), \
                name = COALESCE($3, name), \
                description = COALESCE($4, description), \
                icon = COALESCE($5, icon), \
                color = COALESCE($6, color), \
                config_schema = COALESCE($7, config_schema), \
                pricing = COALESCE($8, pricing), \
                status = COALESCE($9, status), \
                version = COALESCE($10, version), \
                archived_at = CASE WHEN $9 = 'archived' THEN now() ELSE archived_at END, \
                updated_at = now() \
             WHERE id = $1 AND status = $11 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(id)
            .bind(&fields.slug)
            .bind(&fields.name)
            .bind(&fields.description)
            .bind(&fields.icon)
            .bind(&fields.color)
            .bind(&fields.config_schema)
            .bind(&fields.pricing)
            .bind(fields.status.map(|s| s.as_str()))
            .bind(&fields.version)
            .bind(expected_status.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if row.is_none() {
            return Ok(None);
        }
        if let Some(io) = replace_io {
            IoDefinitionRepo::delete_for_definition_inner(&mut tx, id).await?;
            IoDefinitionRepo::insert_all_inner(&mut tx, id, io).await?;
        }

        tx.commit().await?;
        Ok(row)
    }

    /// Deprecate the old row, insert its successor and attach the IO set.
    ///
    /// Returns `None` without writing when the old row is no longer active,
    /// which means another request versioned it first.
    pub async fn apply_version_bump(
        pool: &PgPool,
        bump: &VersionBump,
    ) -> Result<Option<NodeDefinitionRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Must run before the insert so the live-slug index admits the
        // successor.
        let deprecated = sqlx::query(
            "UPDATE node_definitions SET status = 'deprecated', updated_at = now() \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(bump.old_id)
        .execute(&mut *tx)
        .await?;
        if deprecated.rows_affected() == 0 {
            return Ok(None);
        }

        let row = Self::insert_inner(&mut tx, &bump.record).await?;
        IoDefinitionRepo::insert_all_inner(&mut tx, row.id, &bump.io).await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn insert_inner(
        tx: &mut PgTransaction<'_>,
        record: &DefinitionRecord,
    ) -> Result<NodeDefinitionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO node_definitions \
                (kind, slug, name, description, icon, color, version, status, \
                 config_schema, pricing) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeDefinitionRow>(&query)
            .bind(record.kind.as_str())
            .bind(&record.slug)
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.icon)
            .bind(&record.color)
            .bind(&record.version)
            .bind(record.status.as_str())
            .bind(&record.config_schema)
            .bind(&record.pricing)
            .fetch_one(&mut **tx)
            .await
    }
}
