use flowsmith_core::definition::{IoDefinition, NodeDefinition, SocketType};
use flowsmith_core::error::CoreError;
use flowsmith_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `node_definitions` table.
#[derive(Debug, Clone, FromRow)]
pub struct NodeDefinitionRow {
    pub id: DbId,
    pub kind: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub version: String,
    pub status: String,
    pub config_schema: serde_json::Value,
    pub pricing: Option<serde_json::Value>,
    pub archived_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NodeDefinitionRow> for NodeDefinition {
    type Error = CoreError;

    fn try_from(row: NodeDefinitionRow) -> Result<Self, Self::Error> {
        Ok(NodeDefinition {
            id: row.id,
            kind: row.kind.parse()?,
            slug: row.slug,
            name: row.name,
            description: row.description,
            icon: row.icon,
            color: row.color,
            version: row.version,
            status: row.status.parse()?,
            config_schema: row.config_schema,
            pricing: row.pricing,
            archived_at: row.archived_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `io_definitions` table.
#[derive(Debug, Clone, FromRow)]
pub struct IoDefinitionRow {
    pub id: DbId,
    pub definition_id: DbId,
    pub name: String,
    pub label: Option<String>,
    pub direction: String,
    pub socket_type: String,
    pub required: bool,
    pub is_list: bool,
    pub constraints: serde_json::Value,
    pub sort_order: i32,
}

impl TryFrom<IoDefinitionRow> for IoDefinition {
    type Error = CoreError;

    fn try_from(row: IoDefinitionRow) -> Result<Self, Self::Error> {
        Ok(IoDefinition {
            id: row.id,
            definition_id: row.definition_id,
            name: row.name,
            label: row.label,
            direction: row.direction.parse()?,
            socket_type: row.socket_type,
            required: row.required,
            is_list: row.is_list,
            constraints: row.constraints,
            sort_order: row.sort_order,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SocketTypeRow {
    pub name: String,
    pub color: String,
}

impl From<SocketTypeRow> for SocketType {
    fn from(row: SocketTypeRow) -> Self {
        SocketType {
            name: row.name,
            color: row.color,
        }
    }
}
