//! Workflow operations and the optimistic-concurrency save protocol.
//!
//! Every successful write rotates the workflow's `change_hash`. A save that
//! carries a hash other than the stored one loses the race and is rejected
//! with [`CoreError::StaleChangeHash`]; nothing is merged. The storage write
//! is itself conditional on the hash read at the start of the request, so a
//! concurrent writer slipping in between the check and the write is still
//! detected.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::graph::{
    assign_workflow, check_structure, Viewport, Workflow, WorkflowEdge, WorkflowGraph,
    WorkflowNode, WorkflowStatus,
};
use crate::hashing::new_change_hash;
use crate::store::{
    clamp_limit, clamp_offset, GraphStore, GraphWrite, GraphWriteOutcome, NewWorkflow,
    WorkflowFilter, WorkflowMetaPatch,
};
use crate::types::{DbId, Timestamp};
use crate::validation::ValidationEngine;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Proposed graph content submitted by the editor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub viewport: Viewport,
    /// The hash the client last saw. When absent the hash check is skipped,
    /// but the write is still conditional on the hash read by this request.
    pub change_hash: Option<String>,
}

/// An explicit save: graph content plus header fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveWorkflowRequest {
    #[serde(flatten)]
    pub graph: SaveRequest,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved_at: Timestamp,
    pub change_hash: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkflow {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub viewport: Option<Viewport>,
}

/// Header update. Archiving goes through [`WorkflowService::delete`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ListWorkflows {
    pub status: Option<WorkflowStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn GraphStore>,
    validation: ValidationEngine,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn GraphStore>, validation: ValidationEngine) -> Self {
        Self { store, validation }
    }

    pub async fn create(
        &self,
        owner_id: DbId,
        input: CreateWorkflow,
    ) -> Result<Workflow, CoreError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Workflow name must not be empty".into()));
        }
        let viewport = input.viewport.unwrap_or_default();
        let change_hash = new_change_hash(
            &serde_json::json!({ "name": name, "nodes": [], "edges": [] }),
            Utc::now(),
        );
        let workflow = self
            .store
            .create_workflow(&NewWorkflow {
                owner_id,
                name: name.to_string(),
                description: input.description,
                viewport,
                change_hash,
            })
            .await?;
        tracing::info!(workflow_id = workflow.id, owner_id, "Workflow created");
        Ok(workflow)
    }

    /// The caller's workflows, newest first. Archived workflows are only
    /// listed when asked for explicitly.
    pub async fn list(
        &self,
        owner_id: DbId,
        params: ListWorkflows,
    ) -> Result<Vec<Workflow>, CoreError> {
        self.store
            .list_workflows(&WorkflowFilter {
                owner_id: Some(owner_id),
                status: params.status,
                limit: clamp_limit(params.limit),
                offset: clamp_offset(params.offset),
            })
            .await
    }

    pub async fn get(&self, id: DbId, caller_id: DbId) -> Result<WorkflowGraph, CoreError> {
        let workflow = self.load_owned(id, caller_id).await?;
        let (nodes, edges) = self.store.load_graph(id).await?;
        Ok(WorkflowGraph {
            workflow,
            nodes,
            edges,
        })
    }

    pub async fn update(
        &self,
        id: DbId,
        caller_id: DbId,
        input: UpdateWorkflow,
    ) -> Result<Workflow, CoreError> {
        let current = self.load_owned(id, caller_id).await?;
        if input.status == Some(WorkflowStatus::Archived) {
            return Err(CoreError::Validation(
                "Workflows are archived by deleting them".into(),
            ));
        }
        if let Some(name) = &input.name {
            if name.trim().is_empty() {
                return Err(CoreError::Validation("Workflow name must not be empty".into()));
            }
        }

        let patch = WorkflowMetaPatch {
            name: input.name.map(|n| n.trim().to_string()),
            description: input.description,
            status: input.status,
            change_hash: new_change_hash(
                &serde_json::json!({ "workflow": id, "previous": current.change_hash }),
                Utc::now(),
            ),
        };
        self.store
            .update_workflow_meta(id, &patch)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Workflow",
                id,
            })
    }

    /// Soft delete.
    pub async fn delete(&self, id: DbId, caller_id: DbId) -> Result<(), CoreError> {
        self.load_owned(id, caller_id).await?;
        if !self.store.archive_workflow(id).await? {
            return Err(CoreError::NotFound {
                entity: "Workflow",
                id,
            });
        }
        tracing::info!(workflow_id = id, "Workflow archived");
        Ok(())
    }

    /// Persist the editor's graph without touching header fields.
    pub async fn auto_save(
        &self,
        id: DbId,
        caller_id: DbId,
        request: SaveRequest,
    ) -> Result<SaveOutcome, CoreError> {
        self.persist(id, caller_id, request, None, None).await
    }

    /// Persist the graph and the name / description.
    pub async fn save(
        &self,
        id: DbId,
        caller_id: DbId,
        request: SaveWorkflowRequest,
    ) -> Result<SaveOutcome, CoreError> {
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(CoreError::Validation("Workflow name must not be empty".into()));
            }
        }
        self.persist(
            id,
            caller_id,
            request.graph,
            request.name.map(|n| n.trim().to_string()),
            request.description,
        )
        .await
    }

    async fn persist(
        &self,
        id: DbId,
        caller_id: DbId,
        request: SaveRequest,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<SaveOutcome, CoreError> {
        let workflow = self.load_owned(id, caller_id).await?;

        if let Some(client_hash) = &request.change_hash {
            if *client_hash != workflow.change_hash {
                tracing::info!(workflow_id = id, "Rejected save with stale change hash");
                return Err(CoreError::StaleChangeHash {
                    server_hash: workflow.change_hash,
                });
            }
        }

        let SaveRequest {
            mut nodes,
            mut edges,
            viewport,
            ..
        } = request;

        check_structure(&nodes, &edges)?;

        let report = self.validation.validate_workflow(&nodes).await?;
        if !report.is_valid() {
            tracing::debug!(
                workflow_id = id,
                errors = report.errors.len(),
                "Save rejected by validation"
            );
            return Err(CoreError::InvalidFields(report));
        }

        assign_workflow(id, &mut nodes, &mut edges);
        let saved_at = Utc::now();
        let content = serde_json::json!({
            "nodes": nodes,
            "edges": edges,
            "viewport": viewport,
        });
        let change_hash = new_change_hash(&content, saved_at);

        let node_count = nodes.len();
        let edge_count = edges.len();
        let write = GraphWrite {
            nodes,
            edges,
            viewport,
            name,
            description,
            change_hash: change_hash.clone(),
            saved_at,
        };

        match self.store.replace_graph(id, &workflow.change_hash, write).await? {
            GraphWriteOutcome::Written(_) => {
                tracing::info!(
                    workflow_id = id,
                    nodes = node_count,
                    edges = edge_count,
                    "Workflow graph saved"
                );
                Ok(SaveOutcome {
                    saved_at,
                    change_hash,
                })
            }
            GraphWriteOutcome::Stale { server_hash } => {
                tracing::info!(workflow_id = id, "Lost save race to a concurrent writer");
                Err(CoreError::StaleChangeHash { server_hash })
            }
        }
    }

    /// Load a live workflow and check the caller owns it.
    async fn load_owned(&self, id: DbId, caller_id: DbId) -> Result<Workflow, CoreError> {
        let workflow = self
            .store
            .find_workflow(id)
            .await?
            .filter(|w| !w.is_archived())
            .ok_or(CoreError::NotFound {
                entity: "Workflow",
                id,
            })?;
        if workflow.owner_id != caller_id {
            return Err(CoreError::Forbidden(
                "You do not have access to this workflow".into(),
            ));
        }
        Ok(workflow)
    }
}
