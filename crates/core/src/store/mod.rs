//! Storage capabilities the engines are written against.
//!
//! [`GraphStore`] persists workflows and their graphs, [`NodeRegistry`] is the
//! read side of the node-type catalog, and [`CatalogStore`] adds the catalog
//! writes. Every multi-row write is a single method so implementations can
//! run it inside one transaction.
//!
//! The PostgreSQL implementations live in `flowsmith-db`; [`memory`] holds
//! in-process implementations.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::definition::{
    DefinitionKind, DefinitionStatus, IoDefinition, IoPatch, NewIoDefinition, NodeDefinition,
    SocketType,
};
use crate::error::CoreError;
use crate::graph::{Viewport, Workflow, WorkflowEdge, WorkflowNode, WorkflowStatus};
use crate::types::{DbId, Timestamp};

/// Maximum page size for list queries.
pub const MAX_PAGE_SIZE: i64 = 200;
/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Clamp a caller-supplied limit into `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Clamp a caller-supplied offset to be non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

// ---------------------------------------------------------------------------
// Workflow storage
// ---------------------------------------------------------------------------

/// Input for inserting a workflow header.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub owner_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub viewport: Viewport,
    pub change_hash: String,
}

/// List filter for workflows. Archived workflows are excluded unless the
/// status filter asks for them.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub owner_id: Option<DbId>,
    pub status: Option<WorkflowStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Metadata update. `change_hash` is always rotated.
#[derive(Debug, Clone)]
pub struct WorkflowMetaPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub change_hash: String,
}

/// Everything a save writes, applied as one unit.
#[derive(Debug, Clone)]
pub struct GraphWrite {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub viewport: Viewport,
    pub name: Option<String>,
    pub description: Option<String>,
    pub change_hash: String,
    pub saved_at: Timestamp,
}

/// Result of a conditional graph replacement.
#[derive(Debug, Clone)]
pub enum GraphWriteOutcome {
    Written(Workflow),
    /// The stored hash moved since the caller read it; nothing was written.
    Stale { server_hash: String },
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_workflow(&self, input: &NewWorkflow) -> Result<Workflow, CoreError>;

    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError>;

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError>;

    async fn update_workflow_meta(
        &self,
        id: DbId,
        patch: &WorkflowMetaPatch,
    ) -> Result<Option<Workflow>, CoreError>;

    /// Soft-delete. Returns `false` if the workflow did not exist or was
    /// already archived.
    async fn archive_workflow(&self, id: DbId) -> Result<bool, CoreError>;

    async fn load_graph(
        &self,
        workflow_id: DbId,
    ) -> Result<(Vec<WorkflowNode>, Vec<WorkflowEdge>), CoreError>;

    /// Replace all nodes and edges, the viewport and optionally the
    /// name/description, and rotate the change hash, all in one transaction,
    /// provided the stored hash still equals `expected_hash`.
    async fn replace_graph(
        &self,
        workflow_id: DbId,
        expected_hash: &str,
        write: GraphWrite,
    ) -> Result<GraphWriteOutcome, CoreError>;
}

// ---------------------------------------------------------------------------
// Catalog storage
// ---------------------------------------------------------------------------

/// List filter for node definitions.
#[derive(Debug, Clone, Default)]
pub struct DefinitionFilter {
    pub kind: Option<DefinitionKind>,
    pub status: Option<DefinitionStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Full column set of a definition row, minus identity and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionRecord {
    pub kind: DefinitionKind,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub version: String,
    pub status: DefinitionStatus,
    pub config_schema: Value,
    pub pricing: Option<Value>,
}

impl DefinitionRecord {
    pub fn from_definition(def: &NodeDefinition) -> Self {
        Self {
            kind: def.kind,
            slug: def.slug.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            icon: def.icon.clone(),
            color: def.color.clone(),
            version: def.version.clone(),
            status: def.status,
            config_schema: def.config_schema.clone(),
            pricing: def.pricing.clone(),
        }
    }
}

/// Whitelisted columns an in-place update may touch. `None` keeps the
/// stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionFields {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub config_schema: Option<Value>,
    pub pricing: Option<Value>,
    pub status: Option<DefinitionStatus>,
    pub version: Option<String>,
}

/// Copy-on-write version bump, applied atomically:
/// deprecate `old_id`, insert `record`, attach `io` to the new row.
#[derive(Debug, Clone)]
pub struct VersionBump {
    pub old_id: DbId,
    pub record: DefinitionRecord,
    pub io: Vec<NewIoDefinition>,
}

#[async_trait]
pub trait NodeRegistry: Send + Sync {
    async fn find_definition(&self, id: DbId) -> Result<Option<NodeDefinition>, CoreError>;

    /// Batched lookup. Missing ids are simply absent from the result.
    async fn find_definitions(&self, ids: &[DbId]) -> Result<Vec<NodeDefinition>, CoreError>;

    /// The active definition for a slug, if any. Deprecated rows never match.
    async fn find_active_by_slug(&self, slug: &str) -> Result<Option<NodeDefinition>, CoreError>;

    async fn list_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<NodeDefinition>, CoreError>;

    /// IO rows of one definition ordered by `sort_order`.
    async fn list_io(&self, definition_id: DbId) -> Result<Vec<IoDefinition>, CoreError>;

    /// Batched IO lookup for several definitions.
    async fn list_io_for(&self, definition_ids: &[DbId]) -> Result<Vec<IoDefinition>, CoreError>;

    async fn find_io(&self, io_id: DbId) -> Result<Option<IoDefinition>, CoreError>;

    async fn list_socket_types(&self) -> Result<Vec<SocketType>, CoreError>;
}

#[async_trait]
pub trait CatalogStore: NodeRegistry {
    /// Whether a non-deprecated, non-archived definition already uses `slug`.
    async fn slug_in_use(&self, slug: &str, excluding: Option<DbId>) -> Result<bool, CoreError>;

    async fn create_definition(
        &self,
        record: &DefinitionRecord,
        io: &[NewIoDefinition],
    ) -> Result<NodeDefinition, CoreError>;

    /// Apply whitelisted fields in place. When `replace_io` is given the IO
    /// set is deleted and reinserted in the same transaction.
    ///
    /// The write only happens while the row still has `expected_status`;
    /// otherwise nothing changes and `None` is returned.
    async fn update_definition_in_place(
        &self,
        id: DbId,
        expected_status: DefinitionStatus,
        fields: &DefinitionFields,
        replace_io: Option<&[NewIoDefinition]>,
    ) -> Result<Option<NodeDefinition>, CoreError>;

    /// Run the copy-on-write sequence as one transaction and return the new
    /// definition.
    async fn apply_version_bump(&self, bump: &VersionBump) -> Result<NodeDefinition, CoreError>;

    async fn create_io(
        &self,
        definition_id: DbId,
        io: &NewIoDefinition,
    ) -> Result<IoDefinition, CoreError>;

    async fn update_io(&self, io_id: DbId, patch: &IoPatch)
        -> Result<Option<IoDefinition>, CoreError>;

    async fn delete_io(&self, io_id: DbId) -> Result<bool, CoreError>;
}
