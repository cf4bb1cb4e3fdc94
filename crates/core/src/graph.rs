//! Workflow graph model: workflows, nodes, edges, and structural checks.
//!
//! Nodes and edges are keyed by client-generated string ids that are unique
//! within their workflow; the whole set is replaced on every save.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Published,
    Archived,
}

impl WorkflowStatus {
    /// Stable string representation matching serde's `rename_all = "snake_case"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(CoreError::Validation(format!(
                "Unknown workflow status '{other}'"
            ))),
        }
    }
}

/// Canvas viewport persisted alongside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// A workflow header row. Nodes and edges are loaded separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: WorkflowStatus,
    pub change_hash: String,
    pub viewport: Viewport,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub archived_at: Option<Timestamp>,
}

impl Workflow {
    pub fn is_archived(&self) -> bool {
        self.status == WorkflowStatus::Archived || self.archived_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// What a workflow node is an instance of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBinding {
    /// An AI-model catalog definition.
    AiModel { definition_id: DbId },
    /// A system-step catalog definition.
    System { definition_id: DbId },
    /// A UI-only built-in (notes, groups, ...) with no catalog entry.
    Builtin { name: String },
}

impl NodeBinding {
    /// The catalog definition this node references, if any.
    pub fn definition_id(&self) -> Option<DbId> {
        match self {
            Self::AiModel { definition_id } | Self::System { definition_id } => {
                Some(*definition_id)
            }
            Self::Builtin { .. } => None,
        }
    }

    pub fn is_ai_model(&self) -> bool {
        matches!(self, Self::AiModel { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// A node placed on a workflow canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    /// Assigned by the server on save; client values are ignored.
    #[serde(default)]
    pub workflow_id: DbId,
    pub binding: NodeBinding,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub config_values: serde_json::Map<String, Value>,
    #[serde(default)]
    pub ui: Value,
}

fn default_edge_kind() -> String {
    "default".to_string()
}

/// A directed connection from an output socket to an input socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    #[serde(default)]
    pub workflow_id: DbId,
    pub source_node_id: String,
    pub source_socket: String,
    pub target_node_id: String,
    pub target_socket: String,
    #[serde(default = "default_edge_kind")]
    pub kind: String,
    #[serde(default)]
    pub animated: bool,
}

/// A workflow together with its full node and edge sets.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowGraph {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

// ---------------------------------------------------------------------------
// Structural checks
// ---------------------------------------------------------------------------

/// Check graph structure before any rule validation runs.
///
/// Node ids and edge ids must be unique and every edge endpoint must name a
/// node in the same proposed node set.
pub fn check_structure(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Result<(), CoreError> {
    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(CoreError::Validation("Node id must not be empty".into()));
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate node id '{}'",
                node.id
            )));
        }
    }

    let mut edge_ids = HashSet::with_capacity(edges.len());
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate edge id '{}'",
                edge.id
            )));
        }
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Edge '{}' references unknown node '{endpoint}'",
                    edge.id
                )));
            }
        }
    }

    Ok(())
}

/// Stamp every node and edge with the owning workflow id.
pub fn assign_workflow(workflow_id: DbId, nodes: &mut [WorkflowNode], edges: &mut [WorkflowEdge]) {
    for node in nodes.iter_mut() {
        node.workflow_id = workflow_id;
    }
    for edge in edges.iter_mut() {
        edge.workflow_id = workflow_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            workflow_id: 0,
            binding: NodeBinding::Builtin {
                name: "note".into(),
            },
            position: Position::default(),
            size: None,
            config_values: Default::default(),
            ui: Value::Null,
        }
    }

    fn edge(id: &str, from: &str, to: &str) -> WorkflowEdge {
        WorkflowEdge {
            id: id.to_string(),
            workflow_id: 0,
            source_node_id: from.to_string(),
            source_socket: "out".into(),
            target_node_id: to.to_string(),
            target_socket: "in".into(),
            kind: default_edge_kind(),
            animated: false,
        }
    }

    #[test]
    fn structure_accepts_connected_nodes() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![edge("e1", "a", "b")];
        assert!(check_structure(&nodes, &edges).is_ok());
    }

    #[test]
    fn structure_rejects_dangling_edge() {
        let nodes = vec![node("a")];
        let edges = vec![edge("e1", "a", "ghost")];
        assert_matches!(
            check_structure(&nodes, &edges),
            Err(CoreError::Validation(msg)) if msg.contains("ghost")
        );
    }

    #[test]
    fn structure_rejects_duplicate_node_ids() {
        let nodes = vec![node("a"), node("a")];
        assert_matches!(check_structure(&nodes, &[]), Err(CoreError::Validation(_)));
    }

    #[test]
    fn assign_workflow_overwrites_client_ids() {
        let mut nodes = vec![node("a")];
        let mut edges = vec![edge("e1", "a", "a")];
        nodes[0].workflow_id = 99;
        assign_workflow(7, &mut nodes, &mut edges);
        assert_eq!(nodes[0].workflow_id, 7);
        assert_eq!(edges[0].workflow_id, 7);
    }

    #[test]
    fn binding_deserializes_from_tagged_json() {
        let node: WorkflowNode = serde_json::from_value(json!({
            "id": "n1",
            "binding": {"kind": "ai_model", "definition_id": 12},
            "config_values": {"prompt": "a cat"}
        }))
        .unwrap();
        assert_eq!(node.binding.definition_id(), Some(12));
        assert!(node.binding.is_ai_model());
        assert_eq!(node.config_values["prompt"], "a cat");
    }

    #[test]
    fn edge_kind_defaults() {
        let e: WorkflowEdge = serde_json::from_value(json!({
            "id": "e", "source_node_id": "a", "source_socket": "image",
            "target_node_id": "b", "target_socket": "image"
        }))
        .unwrap();
        assert_eq!(e.kind, "default");
        assert!(!e.animated);
    }
}
