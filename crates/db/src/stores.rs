//! PostgreSQL implementations of the core storage traits.

use async_trait::async_trait;
use flowsmith_core::definition::{
    DefinitionStatus, IoDefinition, IoPatch, NewIoDefinition, NodeDefinition, SocketType,
};
use flowsmith_core::error::CoreError;
use flowsmith_core::graph::{Workflow, WorkflowEdge, WorkflowNode};
use flowsmith_core::store::{
    CatalogStore, DefinitionFields, DefinitionFilter, DefinitionRecord, GraphStore, GraphWrite,
    GraphWriteOutcome, NewWorkflow, NodeRegistry, VersionBump, WorkflowFilter, WorkflowMetaPatch,
};
use flowsmith_core::types::DbId;
use sqlx::PgPool;

use crate::repositories::{IoDefinitionRepo, NodeDefinitionRepo, SocketTypeRepo, WorkflowRepo};

/// Map a driver error onto the core taxonomy.
///
/// Unique violations on named `uq_` constraints are caller conflicts;
/// everything else is logged and surfaced as an opaque storage failure.
fn map_db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            if let Some(constraint) = db_err.constraint() {
                if constraint.starts_with("uq_") {
                    return CoreError::Conflict(format!(
                        "Duplicate value violates unique constraint '{constraint}'"
                    ));
                }
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Storage(err.to_string())
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn create_workflow(&self, input: &NewWorkflow) -> Result<Workflow, CoreError> {
        let row = WorkflowRepo::create(&self.pool, input)
            .await
            .map_err(map_db_error)?;
        row.try_into()
    }

    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError> {
        WorkflowRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(Workflow::try_from)
            .transpose()
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
        let rows = WorkflowRepo::list(&self.pool, filter)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn update_workflow_meta(
        &self,
        id: DbId,
        patch: &WorkflowMetaPatch,
    ) -> Result<Option<Workflow>, CoreError> {
        WorkflowRepo::update_meta(&self.pool, id, patch)
            .await
            .map_err(map_db_error)?
            .map(Workflow::try_from)
            .transpose()
    }

    async fn archive_workflow(&self, id: DbId) -> Result<bool, CoreError> {
        WorkflowRepo::archive(&self.pool, id)
            .await
            .map_err(map_db_error)
    }

    async fn load_graph(
        &self,
        workflow_id: DbId,
    ) -> Result<(Vec<WorkflowNode>, Vec<WorkflowEdge>), CoreError> {
        let nodes = WorkflowRepo::list_nodes(&self.pool, workflow_id)
            .await
            .map_err(map_db_error)?;
        let edges = WorkflowRepo::list_edges(&self.pool, workflow_id)
            .await
            .map_err(map_db_error)?;
        Ok((
            convert_all(nodes)?,
            edges.into_iter().map(WorkflowEdge::from).collect(),
        ))
    }

    async fn replace_graph(
        &self,
        workflow_id: DbId,
        expected_hash: &str,
        write: GraphWrite,
    ) -> Result<GraphWriteOutcome, CoreError> {
        let written = WorkflowRepo::replace_graph(&self.pool, workflow_id, expected_hash, &write)
            .await
            .map_err(map_db_error)?;
        if let Some(row) = written {
            return Ok(GraphWriteOutcome::Written(row.try_into()?));
        }

        // Nothing matched: either the hash moved or the row is gone.
        match WorkflowRepo::find_by_id(&self.pool, workflow_id)
            .await
            .map_err(map_db_error)?
        {
            Some(current) if current.status != "archived" => Ok(GraphWriteOutcome::Stale {
                server_hash: current.change_hash,
            }),
            _ => Err(CoreError::NotFound {
                entity: "Workflow",
                id: workflow_id,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Node catalog
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeRegistry for PgCatalogStore {
    async fn find_definition(&self, id: DbId) -> Result<Option<NodeDefinition>, CoreError> {
        NodeDefinitionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(NodeDefinition::try_from)
            .transpose()
    }

    async fn find_definitions(&self, ids: &[DbId]) -> Result<Vec<NodeDefinition>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = NodeDefinitionRepo::find_by_ids(&self.pool, ids)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn find_active_by_slug(&self, slug: &str) -> Result<Option<NodeDefinition>, CoreError> {
        NodeDefinitionRepo::find_active_by_slug(&self.pool, slug)
            .await
            .map_err(map_db_error)?
            .map(NodeDefinition::try_from)
            .transpose()
    }

    async fn list_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<NodeDefinition>, CoreError> {
        let rows = NodeDefinitionRepo::list(&self.pool, filter)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn list_io(&self, definition_id: DbId) -> Result<Vec<IoDefinition>, CoreError> {
        let rows = IoDefinitionRepo::list_for_definition(&self.pool, definition_id)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn list_io_for(&self, definition_ids: &[DbId]) -> Result<Vec<IoDefinition>, CoreError> {
        if definition_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = IoDefinitionRepo::list_for_definitions(&self.pool, definition_ids)
            .await
            .map_err(map_db_error)?;
        convert_all(rows)
    }

    async fn find_io(&self, io_id: DbId) -> Result<Option<IoDefinition>, CoreError> {
        IoDefinitionRepo::find_by_id(&self.pool, io_id)
            .await
            .map_err(map_db_error)?
            .map(IoDefinition::try_from)
            .transpose()
    }

    async fn list_socket_types(&self) -> Result<Vec<SocketType>, CoreError> {
        let rows = SocketTypeRepo::list(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(SocketType::from).collect())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn slug_in_use(&self, slug: &str, excluding: Option<DbId>) -> Result<bool, CoreError> {
        NodeDefinitionRepo::slug_in_use(&self.pool, slug, excluding)
            .await
            .map_err(map_db_error)
    }

    async fn create_definition(
        &self,
        record: &DefinitionRecord,
        io: &[NewIoDefinition],
    ) -> Result<NodeDefinition, CoreError> {
        let row = NodeDefinitionRepo::create(&self.pool, record, io)
            .await
            .map_err(map_db_error)?;
        row.try_into()
    }

    async fn update_definition_in_place(
        &self,
        id: DbId,
        expected_status: DefinitionStatus,
        fields: &DefinitionFields,
        replace_io: Option<&[NewIoDefinition]>,
    ) -> Result<Option<NodeDefinition>, CoreError> {
        NodeDefinitionRepo::update_in_place(&self.pool, id, expected_status, fields, replace_io)
            .await
            .map_err(map_db_error)?
            .map(NodeDefinition::try_from)
            .transpose()
    }

    async fn apply_version_bump(&self, bump: &VersionBump) -> Result<NodeDefinition, CoreError> {
        let row = NodeDefinitionRepo::apply_version_bump(&self.pool, bump)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "Node definition {} is no longer active",
                    bump.old_id
                ))
            })?;
        row.try_into()
    }

    async fn create_io(
        &self,
        definition_id: DbId,
        io: &NewIoDefinition,
    ) -> Result<IoDefinition, CoreError> {
        let row = IoDefinitionRepo::create(&self.pool, definition_id, io)
            .await
            .map_err(map_db_error)?;
        row.try_into()
    }

    async fn update_io(
        &self,
        io_id: DbId,
        patch: &IoPatch,
    ) -> Result<Option<IoDefinition>, CoreError> {
        IoDefinitionRepo::update(&self.pool, io_id, patch)
            .await
            .map_err(map_db_error)?
            .map(IoDefinition::try_from)
            .transpose()
    }

    async fn delete_io(&self, io_id: DbId) -> Result<bool, CoreError> {
        IoDefinitionRepo::delete(&self.pool, io_id)
            .await
            .map_err(map_db_error)
    }
}
