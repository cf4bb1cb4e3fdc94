//! Repository for the `io_definitions` table.

use flowsmith_core::definition::{IoPatch, NewIoDefinition};
use flowsmith_core::types::DbId;
use sqlx::PgPool;

use super::PgTransaction;
use crate::models::node_definition::IoDefinitionRow;

/// Column list for io_definitions queries.
const COLUMNS: &str = "id, definition_id, name, label, direction, socket_type, required, \
    is_list, constraints, sort_order";

pub struct IoDefinitionRepo;

impl IoDefinitionRepo {
    pub async fn list_for_definition(
        pool: &PgPool,
        definition_id: DbId,
    ) -> Result<Vec<IoDefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM io_definitions WHERE definition_id = $1 ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, IoDefinitionRow>(&query)
            .bind(definition_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_definitions(
        pool: &PgPool,
        definition_ids: &[DbId],
    ) -> Result<Vec<IoDefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM io_definitions WHERE definition_id = ANY($1) \
             ORDER BY definition_id, sort_order, id"
        );
        sqlx::query_as::<_, IoDefinitionRow>(&query)
            .bind(definition_ids)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<IoDefinitionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM io_definitions WHERE id = $1");
        sqlx::query_as::<_, IoDefinitionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        definition_id: DbId,
        input: &NewIoDefinition,
    ) -> Result<IoDefinitionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO io_definitions \
                (definition_id, name, label, direction, socket_type, required, is_list, \
                 constraints, sort_order) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IoDefinitionRow>(&query)
            .bind(definition_id)
            .bind(&input.name)
            .bind(&input.label)
            .bind(input.direction.as_str())
            .bind(&input.socket_type)
            .bind(input.required)
            .bind(input.is_list)
            .bind(&input.constraints)
            .bind(input.sort_order)
            .fetch_one(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: DbId,
        patch: &IoPatch,
    ) -> Result<Option<IoDefinitionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE io_definitions SET \
                name = COALESCE($2, name), \
                label = COALESCE($3, label), \
                direction = COALESCE($4, direction), \
                socket_type = COALESCE($5, socket_type), \
                required = COALESCE($6, required), \
                is_list = COALESCE($7, is_list), \
                constraints = COALESCE($8, constraints), \
                sort_order = COALESCE($9, sort_order) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IoDefinitionRow>(&query)
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.label)
            .bind(patch.direction.map(|d| d.as_str()))
            .bind(&patch.socket_type)
            .bind(patch.required)
            .bind(patch.is_list)
            .bind(&patch.constraints)
            .bind(patch.sort_order)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM io_definitions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn insert_all_inner(
        tx: &mut PgTransaction<'_>,
        definition_id: DbId,
        rows: &[NewIoDefinition],
    ) -> Result<(), sqlx::Error> {
        for input in rows {
            sqlx::query(
                "INSERT INTO io_definitions \
                    (definition_id, name, label, direction, socket_type, required, is_list, \
                     constraints, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(definition_id)
            .bind(&input.name)
            .bind(&input.label)
            .bind(input.direction.as_str())
            .bind(&input.socket_type)
            .bind(input.required)
            .bind(input.is_list)
            .bind(&input.constraints)
            .bind(input.sort_order)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn delete_for_definition_inner(
        tx: &mut PgTransaction<'_>,
        definition_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM io_definitions WHERE definition_id = $1")
            .bind(definition_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
