//! Field rule and validation result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{IoDefinition, IoDirection};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

pub const REQUIRED: &str = "REQUIRED";
pub const MIN_LENGTH: &str = "MIN_LENGTH";
pub const MAX_LENGTH: &str = "MAX_LENGTH";
pub const PATTERN: &str = "PATTERN";
pub const MIN_VALUE: &str = "MIN_VALUE";
pub const MAX_VALUE: &str = "MAX_VALUE";
pub const INVALID_OPTION: &str = "INVALID_OPTION";
pub const DEFINITION_NOT_FOUND: &str = "DEFINITION_NOT_FOUND";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Validation rule for one configurable field, derived from an INPUT socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub field: String,
    pub required: bool,
    pub socket_type: String,
    pub is_list: bool,
    pub constraints: serde_json::Map<String, Value>,
}

impl FieldRule {
    /// Build a rule from an IO row. Constraints that are not a JSON object
    /// (or a JSON-encoded object) are treated as empty.
    pub fn from_io(io: &IoDefinition) -> Self {
        let constraints = match crate::definition::normalize_json_document(&io.constraints) {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            field: io.name.clone(),
            required: io.required,
            socket_type: io.socket_type.clone(),
            is_list: io.is_list,
            constraints,
        }
    }
}

/// All field rules of one definition, in socket sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub definition_id: DbId,
    pub fields: Vec<FieldRule>,
}

impl RuleSet {
    /// Build the rule set from a definition's IO rows, keeping only inputs.
    pub fn from_io(definition_id: DbId, io: &[IoDefinition]) -> Self {
        let mut inputs: Vec<&IoDefinition> = io
            .iter()
            .filter(|row| row.direction == IoDirection::Input)
            .collect();
        inputs.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Self {
            definition_id,
            fields: inputs.into_iter().map(FieldRule::from_io).collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.field == field)
    }

    /// `fieldName -> {required, socketType, isList, constraints}` map as
    /// served to clients for pre-validation.
    pub fn to_field_map(&self) -> serde_json::Map<String, Value> {
        self.fields
            .iter()
            .map(|rule| {
                (
                    rule.field.clone(),
                    serde_json::json!({
                        "required": rule.required,
                        "socketType": rule.socket_type,
                        "isList": rule.is_list,
                        "constraints": rule.constraints,
                    }),
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Per-field entry in the node error map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub code: String,
    pub message: String,
}

/// Aggregated result of validating a workflow's node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Flat list in node order, then rule order.
    pub errors: Vec<FieldError>,
    /// `nodeId -> field -> issues`.
    pub node_errors: BTreeMap<String, BTreeMap<String, Vec<FieldIssue>>>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error for a node, filling both views.
    pub fn push(&mut self, node_id: &str, mut error: FieldError) {
        self.node_errors
            .entry(node_id.to_string())
            .or_default()
            .entry(error.field.clone())
            .or_default()
            .push(FieldIssue {
                code: error.code.clone(),
                message: error.message.clone(),
            });
        error.node_id = Some(node_id.to_string());
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn io(name: &str, direction: IoDirection, sort_order: i32) -> IoDefinition {
        IoDefinition {
            id: 1,
            definition_id: 3,
            name: name.to_string(),
            label: None,
            direction,
            socket_type: "text".into(),
            required: true,
            is_list: false,
            constraints: json!("{\"maxLength\": 10}"),
            sort_order,
        }
    }

    #[test]
    fn rule_set_keeps_inputs_in_sort_order() {
        let rows = vec![
            io("b", IoDirection::Input, 2),
            io("out", IoDirection::Output, 0),
            io("a", IoDirection::Input, 1),
        ];
        let rules = RuleSet::from_io(3, &rows);
        let names: Vec<&str> = rules.fields.iter().map(|r| r.field.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(rules.get("a").unwrap().constraints["maxLength"], 10);
    }

    #[test]
    fn field_map_shape() {
        let rules = RuleSet::from_io(3, &[io("prompt", IoDirection::Input, 0)]);
        let map = rules.to_field_map();
        assert_eq!(map["prompt"]["required"], true);
        assert_eq!(map["prompt"]["socketType"], "text");
    }

    #[test]
    fn report_fills_both_views() {
        let mut report = ValidationReport::default();
        report.push(
            "n1",
            FieldError {
                field: "prompt".into(),
                code: REQUIRED.into(),
                message: "This field is required".into(),
                node_id: None,
            },
        );
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].node_id.as_deref(), Some("n1"));
        assert_eq!(report.node_errors["n1"]["prompt"][0].code, REQUIRED);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["nodeId"], "n1");
        assert!(json["nodeErrors"]["n1"].is_object());
    }
}
