//! Shared query parameter types for API handlers.
//!
//! Pagination fields are inlined rather than flattened: flattened structs
//! lose numeric parsing in query strings. Values are clamped by the services.

use flowsmith_core::definition::{DefinitionKind, DefinitionStatus};
use flowsmith_core::graph::WorkflowStatus;
use serde::Deserialize;

/// `GET /workflows` query.
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowListParams {
    pub status: Option<WorkflowStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /node-definitions` query.
#[derive(Debug, Default, Deserialize)]
pub struct DefinitionListParams {
    pub kind: Option<DefinitionKind>,
    pub status: Option<DefinitionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
