//! In-process store implementations.
//!
//! Each store keeps its state behind a single `tokio::sync::Mutex`, so every
//! trait method is atomic with respect to the others. Used by tests across the
//! workspace and for running the API without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    CatalogStore, DefinitionFields, DefinitionFilter, DefinitionRecord, GraphStore, GraphWrite,
    GraphWriteOutcome, NewWorkflow, NodeRegistry, VersionBump, WorkflowFilter, WorkflowMetaPatch,
    MAX_PAGE_SIZE,
};
use crate::definition::{
    DefinitionStatus, IoDefinition, IoPatch, NewIoDefinition, NodeDefinition, SocketType,
};
use crate::error::CoreError;
use crate::graph::{Workflow, WorkflowEdge, WorkflowNode, WorkflowStatus};
use crate::types::DbId;

fn page<T>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    let limit = if limit <= 0 { MAX_PAGE_SIZE } else { limit };
    items
        .skip(offset.max(0) as usize)
        .take(limit as usize)
        .collect()
}

// ---------------------------------------------------------------------------
// Graph store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GraphState {
    next_id: DbId,
    workflows: BTreeMap<DbId, Workflow>,
    nodes: HashMap<DbId, Vec<WorkflowNode>>,
    edges: HashMap<DbId, Vec<WorkflowEdge>>,
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    state: Mutex<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_workflow(&self, input: &NewWorkflow) -> Result<Workflow, CoreError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let now = Utc::now();
        let workflow = Workflow {
            id: state.next_id,
            owner_id: input.owner_id,
            name: input.name.clone(),
            description: input.description.clone(),
            status: WorkflowStatus::Draft,
            change_hash: input.change_hash.clone(),
            viewport: input.viewport,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn find_workflow(&self, id: DbId) -> Result<Option<Workflow>, CoreError> {
        Ok(self.state.lock().await.workflows.get(&id).cloned())
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Workflow> = state
            .workflows
            .values()
            .filter(|w| filter.owner_id.is_none_or(|owner| w.owner_id == owner))
            .filter(|w| match filter.status {
                Some(status) => w.status == status,
                None => w.status != WorkflowStatus::Archived,
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(page(rows.into_iter().cloned(), filter.limit, filter.offset))
    }

    async fn update_workflow_meta(
        &self,
        id: DbId,
        patch: &WorkflowMetaPatch,
    ) -> Result<Option<Workflow>, CoreError> {
        let mut state = self.state.lock().await;
        let Some(workflow) = state.workflows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            workflow.name = name.clone();
        }
        if let Some(description) = &patch.description {
            workflow.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            workflow.status = status;
        }
        workflow.change_hash = patch.change_hash.clone();
        workflow.updated_at = Utc::now();
        Ok(Some(workflow.clone()))
    }

    async fn archive_workflow(&self, id: DbId) -> Result<bool, CoreError> {
        let mut state = self.state.lock().await;
        match state.workflows.get_mut(&id) {
            Some(workflow) if workflow.status != WorkflowStatus::Archived => {
                let now = Utc::now();
                workflow.status = WorkflowStatus::Archived;
                workflow.archived_at = Some(now);
                workflow.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_graph(
        &self,
        workflow_id: DbId,
    ) -> Result<(Vec<WorkflowNode>, Vec<WorkflowEdge>), CoreError> {
        let state = self.state.lock().await;
        Ok((
            state.nodes.get(&workflow_id).cloned().unwrap_or_default(),
            state.edges.get(&workflow_id).cloned().unwrap_or_default(),
        ))
    }

    async fn replace_graph(
        &self,
        workflow_id: DbId,
        expected_hash: &str,
        write: GraphWrite,
    ) -> Result<GraphWriteOutcome, CoreError> {
        let mut state = self.state.lock().await;
        let workflow = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or(CoreError::NotFound {
                entity: "Workflow",
                id: workflow_id,
            })?;

        if workflow.change_hash != expected_hash {
            return Ok(GraphWriteOutcome::Stale {
                server_hash: workflow.change_hash.clone(),
            });
        }

        if let Some(name) = write.name {
            workflow.name = name;
        }
        if let Some(description) = write.description {
            workflow.description = Some(description);
        }
        workflow.viewport = write.viewport;
        workflow.change_hash = write.change_hash;
        workflow.updated_at = write.saved_at;
        let saved = workflow.clone();

        state.nodes.insert(workflow_id, write.nodes);
        state.edges.insert(workflow_id, write.edges);
        Ok(GraphWriteOutcome::Written(saved))
    }
}

// ---------------------------------------------------------------------------
// Catalog store
// ---------------------------------------------------------------------------

struct CatalogState {
    next_definition_id: DbId,
    next_io_id: DbId,
    definitions: BTreeMap<DbId, NodeDefinition>,
    io: BTreeMap<DbId, IoDefinition>,
    socket_types: Vec<SocketType>,
}

impl CatalogState {
    fn insert_definition(&mut self, record: &DefinitionRecord) -> NodeDefinition {
        self.next_definition_id += 1;
        let now = Utc::now();
        let definition = NodeDefinition {
            id: self.next_definition_id,
            kind: record.kind,
            slug: record.slug.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            icon: record.icon.clone(),
            color: record.color.clone(),
            version: record.version.clone(),
            status: record.status,
            config_schema: record.config_schema.clone(),
            pricing: record.pricing.clone(),
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.definitions.insert(definition.id, definition.clone());
        definition
    }

    fn insert_io(&mut self, definition_id: DbId, io: &NewIoDefinition) -> IoDefinition {
        self.next_io_id += 1;
        let row = IoDefinition {
            id: self.next_io_id,
            definition_id,
            name: io.name.clone(),
            label: io.label.clone(),
            direction: io.direction,
            socket_type: io.socket_type.clone(),
            required: io.required,
            is_list: io.is_list,
            constraints: io.constraints.clone(),
            sort_order: io.sort_order,
        };
        self.io.insert(row.id, row.clone());
        row
    }

    fn io_of(&self, definition_id: DbId) -> Vec<IoDefinition> {
        let mut rows: Vec<IoDefinition> = self
            .io
            .values()
            .filter(|io| io.definition_id == definition_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
        rows
    }
}

/// Socket types every catalog starts with.
pub fn default_socket_types() -> Vec<SocketType> {
    [
        ("text", "#64748b"),
        ("image", "#22c55e"),
        ("video", "#a855f7"),
        ("audio", "#f97316"),
        ("number", "#3b82f6"),
        ("boolean", "#eab308"),
        ("json", "#14b8a6"),
    ]
    .into_iter()
    .map(|(name, color)| SocketType {
        name: name.to_string(),
        color: color.to_string(),
    })
    .collect()
}

pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CatalogState {
                next_definition_id: 0,
                next_io_id: 0,
                definitions: BTreeMap::new(),
                io: BTreeMap::new(),
                socket_types: default_socket_types(),
            }),
        }
    }

    /// Number of definition rows, across all statuses.
    pub async fn definition_count(&self) -> usize {
        self.state.lock().await.definitions.len()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRegistry for InMemoryCatalog {
    async fn find_definition(&self, id: DbId) -> Result<Option<NodeDefinition>, CoreError> {
        Ok(self.state.lock().await.definitions.get(&id).cloned())
    }

    async fn find_definitions(&self, ids: &[DbId]) -> Result<Vec<NodeDefinition>, CoreError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.definitions.get(id).cloned())
            .collect())
    }

    async fn find_active_by_slug(&self, slug: &str) -> Result<Option<NodeDefinition>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .definitions
            .values()
            .filter(|d| d.slug == slug && d.status == DefinitionStatus::Active)
            .max_by_key(|d| d.id)
            .cloned())
    }

    async fn list_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<NodeDefinition>, CoreError> {
        let state = self.state.lock().await;
        let rows = state
            .definitions
            .values()
            .filter(|d| filter.kind.is_none_or(|k| d.kind == k))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .cloned();
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn list_io(&self, definition_id: DbId) -> Result<Vec<IoDefinition>, CoreError> {
        Ok(self.state.lock().await.io_of(definition_id))
    }

    async fn list_io_for(&self, definition_ids: &[DbId]) -> Result<Vec<IoDefinition>, CoreError> {
        let state = self.state.lock().await;
        Ok(definition_ids
            .iter()
            .flat_map(|id| state.io_of(*id))
            .collect())
    }

    async fn find_io(&self, io_id: DbId) -> Result<Option<IoDefinition>, CoreError> {
        Ok(self.state.lock().await.io.get(&io_id).cloned())
    }

    async fn list_socket_types(&self) -> Result<Vec<SocketType>, CoreError> {
        Ok(self.state.lock().await.socket_types.clone())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn slug_in_use(&self, slug: &str, excluding: Option<DbId>) -> Result<bool, CoreError> {
        let state = self.state.lock().await;
        Ok(state.definitions.values().any(|d| {
            d.slug == slug
                && Some(d.id) != excluding
                && matches!(d.status, DefinitionStatus::Draft | DefinitionStatus::Active)
        }))
    }

    async fn create_definition(
        &self,
        record: &DefinitionRecord,
        io: &[NewIoDefinition],
    ) -> Result<NodeDefinition, CoreError> {
        let mut state = self.state.lock().await;
        let definition = state.insert_definition(record);
        for row in io {
            state.insert_io(definition.id, row);
        }
        Ok(definition)
    }

    async fn update_definition_in_place(
        &self,
        id: DbId,
        expected_status: DefinitionStatus,
        fields: &DefinitionFields,
        replace_io: Option<&[NewIoDefinition]>,
    ) -> Result<Option<NodeDefinition>, CoreError> {
        let mut state = self.state.lock().await;
        let Some(definition) = state
            .definitions
            .get_mut(&id)
            .filter(|d| d.status == expected_status)
        else {
            return Ok(None);
        };
        if let Some(v) = &fields.slug {
            definition.slug = v.clone();
        }
        if let Some(v) = &fields.name {
            definition.name = v.clone();
        }
        if let Some(v) = &fields.description {
            definition.description = Some(v.clone());
        }
        if let Some(v) = &fields.icon {
            definition.icon = Some(v.clone());
        }
        if let Some(v) = &fields.color {
            definition.color = Some(v.clone());
        }
        if let Some(v) = &fields.config_schema {
            definition.config_schema = v.clone();
        }
        if let Some(v) = &fields.pricing {
            definition.pricing = Some(v.clone());
        }
        if let Some(v) = fields.status {
            definition.status = v;
            if v == DefinitionStatus::Archived {
                definition.archived_at = Some(Utc::now());
            }
        }
        if let Some(v) = &fields.version {
            definition.version = v.clone();
        }
        definition.updated_at = Utc::now();
        let updated = definition.clone();

        if let Some(rows) = replace_io {
            state.io.retain(|_, io| io.definition_id != id);
            for row in rows {
                state.insert_io(id, row);
            }
        }
        Ok(Some(updated))
    }

    async fn apply_version_bump(&self, bump: &VersionBump) -> Result<NodeDefinition, CoreError> {
        let mut state = self.state.lock().await;
        let old = state
            .definitions
            .get_mut(&bump.old_id)
            .ok_or(CoreError::NotFound {
                entity: "NodeDefinition",
                id: bump.old_id,
            })?;
        if old.status != DefinitionStatus::Active {
            return Err(CoreError::Conflict(format!(
                "Node definition {} is no longer active",
                bump.old_id
            )));
        }
        old.status = DefinitionStatus::Deprecated;
        old.updated_at = Utc::now();

        let created = state.insert_definition(&bump.record);
        for row in &bump.io {
            state.insert_io(created.id, row);
        }
        Ok(created)
    }

    async fn create_io(
        &self,
        definition_id: DbId,
        io: &NewIoDefinition,
    ) -> Result<IoDefinition, CoreError> {
        let mut state = self.state.lock().await;
        if !state.definitions.contains_key(&definition_id) {
            return Err(CoreError::NotFound {
                entity: "NodeDefinition",
                id: definition_id,
            });
        }
        Ok(state.insert_io(definition_id, io))
    }

    async fn update_io(
        &self,
        io_id: DbId,
        patch: &IoPatch,
    ) -> Result<Option<IoDefinition>, CoreError> {
        let mut state = self.state.lock().await;
        let Some(row) = state.io.get_mut(&io_id) else {
            return Ok(None);
        };
        if let Some(v) = &patch.name {
            row.name = v.clone();
        }
        if let Some(v) = &patch.label {
            row.label = Some(v.clone());
        }
        if let Some(v) = patch.direction {
            row.direction = v;
        }
        if let Some(v) = &patch.socket_type {
            row.socket_type = v.clone();
        }
        if let Some(v) = patch.required {
            row.required = v;
        }
        if let Some(v) = patch.is_list {
            row.is_list = v;
        }
        if let Some(v) = &patch.constraints {
            row.constraints = v.clone();
        }
        if let Some(v) = patch.sort_order {
            row.sort_order = v;
        }
        Ok(Some(row.clone()))
    }

    async fn delete_io(&self, io_id: DbId) -> Result<bool, CoreError> {
        Ok(self.state.lock().await.io.remove(&io_id).is_some())
    }
}
