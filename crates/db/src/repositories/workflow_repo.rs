//! Repository for the `workflows`, `workflow_nodes` and `workflow_edges`
//! tables.

use flowsmith_core::graph::{WorkflowEdge, WorkflowNode};
use flowsmith_core::store::{GraphWrite, NewWorkflow, WorkflowFilter, WorkflowMetaPatch};
use flowsmith_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use super::PgTransaction;
use crate::models::workflow::{WorkflowEdgeRow, WorkflowNodeRow, WorkflowRow};

/// Column list for workflows queries.
const COLUMNS: &str = "id, owner_id, name, description, status, change_hash, viewport, \
    created_at, updated_at, archived_at";

const NODE_COLUMNS: &str =
    "workflow_id, node_key, binding, position, size, config_values, ui";

const EDGE_COLUMNS: &str = "workflow_id, edge_key, source_node_key, source_socket, \
    target_node_key, target_socket, kind, animated";

pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a new draft workflow, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewWorkflow) -> Result<WorkflowRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows (owner_id, name, description, viewport, change_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(Json(&input.viewport))
            .bind(&input.change_hash)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List workflows, newest first. Archived rows only appear when the
    /// status filter asks for them.
    pub async fn list(
        pool: &PgPool,
        filter: &WorkflowFilter,
    ) -> Result<Vec<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflows \
             WHERE ($1::BIGINT IS NULL OR owner_id = $1) \
               AND (CASE WHEN $2::TEXT IS NULL THEN status <> 'archived' ELSE status = $2 END) \
             ORDER BY updated_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(filter.owner_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Update header fields and rotate the change hash.
    pub async fn update_meta(
        pool: &PgPool,
        id: DbId,
        patch: &WorkflowMetaPatch,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                status = COALESCE($4, status), \
                change_hash = $5, \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.description)
            .bind(patch.status.map(|s| s.as_str()))
            .bind(&patch.change_hash)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete. Returns `true` if a live row was archived.
    pub async fn archive(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE workflows SET status = 'archived', archived_at = now(), updated_at = now() \
             WHERE id = $1 AND status <> 'archived'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_nodes(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowNodeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {NODE_COLUMNS} FROM workflow_nodes WHERE workflow_id = $1 ORDER BY sort_order"
        );
        sqlx::query_as::<_, WorkflowNodeRow>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_edges(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowEdgeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {EDGE_COLUMNS} FROM workflow_edges WHERE workflow_id = $1 ORDER BY sort_order"
        );
        sqlx::query_as::<_, WorkflowEdgeRow>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// Replace the whole graph in one transaction, provided the stored hash
    /// still equals `expected_hash`.
    ///
    /// Returns `None` (and writes nothing) when the hash moved or the
    /// workflow is gone or archived.
    pub async fn replace_graph(
        pool: &PgPool,
        workflow_id: DbId,
        expected_hash: &str,
        write: &GraphWrite,
    ) -> Result<Option<WorkflowRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE workflows SET \
                viewport = $3, \
                name = COALESCE($4, name), \
                description = COALESCE($5, description), \
                change_hash = $6, \
                updated_at = $7 \
             WHERE id = $1 AND change_hash = $2 AND status <> 'archived' \
             RETURNING {COLUMNS}"
        );
        let Some(row) = sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(workflow_id)
            .bind(expected_hash)
            .bind(Json(&write.viewport))
            .bind(&write.name)
            .bind(&write.description)
            .bind(&write.change_hash)
            .bind(write.saved_at)
            .fetch_optional(&mut *tx)
            .await?
        else {
            // Dropping the transaction rolls it back.
            return Ok(None);
        };

        // Edges go with their nodes via ON DELETE CASCADE.
        sqlx::query("DELETE FROM workflow_nodes WHERE workflow_id = $1")
            .bind(workflow_id)
            .execute(&mut *tx)
            .await?;

        Self::insert_nodes_inner(&mut tx, workflow_id, &write.nodes).await?;
        Self::insert_edges_inner(&mut tx, workflow_id, &write.edges).await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn insert_nodes_inner(
        tx: &mut PgTransaction<'_>,
        workflow_id: DbId,
        nodes: &[WorkflowNode],
    ) -> Result<(), sqlx::Error> {
        for (i, node) in nodes.iter().enumerate() {
            sqlx::query(
                "INSERT INTO workflow_nodes \
                    (workflow_id, node_key, binding, position, size, config_values, ui, \
                     sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(workflow_id)
            .bind(&node.id)
            .bind(Json(&node.binding))
            .bind(Json(&node.position))
            .bind(node.size.as_ref().map(Json))
            .bind(Json(&node.config_values))
            .bind(Json(&node.ui))
            .bind(i as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_edges_inner(
        tx: &mut PgTransaction<'_>,
        workflow_id: DbId,
        edges: &[WorkflowEdge],
    ) -> Result<(), sqlx::Error> {
        for (i, edge) in edges.iter().enumerate() {
            sqlx::query(
                "INSERT INTO workflow_edges \
                    (workflow_id, edge_key, source_node_key, source_socket, \
                     target_node_key, target_socket, kind, animated, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(workflow_id)
            .bind(&edge.id)
            .bind(&edge.source_node_id)
            .bind(&edge.source_socket)
            .bind(&edge.target_node_id)
            .bind(&edge.target_socket)
            .bind(&edge.kind)
            .bind(edge.animated)
            .bind(i as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}
