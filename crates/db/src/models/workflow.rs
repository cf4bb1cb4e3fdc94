use flowsmith_core::error::CoreError;
use flowsmith_core::graph::{NodeBinding, Workflow, WorkflowEdge, WorkflowNode};
use flowsmith_core::types::{DbId, Timestamp};
use serde::de::DeserializeOwned;
use sqlx::FromRow;

pub(crate) fn from_json<T: DeserializeOwned>(
    column: &str,
    value: serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Storage(format!("Malformed {column} column: {e}")))
}

/// A row from the `workflows` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub change_hash: String,
    pub viewport: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub archived_at: Option<Timestamp>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = CoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(Workflow {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            status: row.status.parse()?,
            change_hash: row.change_hash,
            viewport: from_json("viewport", row.viewport)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
        })
    }
}

/// A row from the `workflow_nodes` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowNodeRow {
    pub workflow_id: DbId,
    pub node_key: String,
    pub binding: serde_json::Value,
    pub position: serde_json::Value,
    pub size: Option<serde_json::Value>,
    pub config_values: serde_json::Value,
    pub ui: serde_json::Value,
}

impl TryFrom<WorkflowNodeRow> for WorkflowNode {
    type Error = CoreError;

    fn try_from(row: WorkflowNodeRow) -> Result<Self, Self::Error> {
        let binding: NodeBinding = from_json("binding", row.binding)?;
        Ok(WorkflowNode {
            id: row.node_key,
            workflow_id: row.workflow_id,
            binding,
            position: from_json("position", row.position)?,
            size: row.size.map(|s| from_json("size", s)).transpose()?,
            config_values: from_json("config_values", row.config_values)?,
            ui: row.ui,
        })
    }
}

/// A row from the `workflow_edges` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowEdgeRow {
    pub workflow_id: DbId,
    pub edge_key: String,
    pub source_node_key: String,
    pub source_socket: String,
    pub target_node_key: String,
    pub target_socket: String,
    pub kind: String,
    pub animated: bool,
}

impl From<WorkflowEdgeRow> for WorkflowEdge {
    fn from(row: WorkflowEdgeRow) -> Self {
        WorkflowEdge {
            id: row.edge_key,
            workflow_id: row.workflow_id,
            source_node_id: row.source_node_key,
            source_socket: row.source_socket,
            target_node_id: row.target_node_key,
            target_socket: row.target_socket,
            kind: row.kind,
            animated: row.animated,
        }
    }
}
