//! Node-type catalog model: definitions, IO sockets, lifecycle, and the
//! canonical forms used to decide whether an edit changes a definition's
//! contract.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Version assigned to newly created definitions.
pub const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which catalog a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    AiModel,
    System,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiModel => "ai_model",
            Self::System => "system",
        }
    }
}

impl FromStr for DefinitionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai_model" => Ok(Self::AiModel),
            "system" => Ok(Self::System),
            other => Err(CoreError::Validation(format!(
                "Unknown definition kind '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of a node definition.
///
/// ```text
/// draft ──> active ──> deprecated
///   │
///   └────> archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    Draft,
    Active,
    Deprecated,
    Archived,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }

    /// Only draft and active definitions accept edits.
    pub fn accepts_edits(&self) -> bool {
        matches!(self, Self::Draft | Self::Active)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: DefinitionStatus) -> bool {
        use DefinitionStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Draft, Active) | (Draft, Archived) | (Active, Deprecated)
            )
    }
}

impl fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "archived" => Ok(Self::Archived),
            other => Err(CoreError::Validation(format!(
                "Unknown definition status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IoDirection {
    Input,
    Output,
}

impl IoDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

impl FromStr for IoDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INPUT" => Ok(Self::Input),
            "OUTPUT" => Ok(Self::Output),
            other => Err(CoreError::Validation(format!(
                "Unknown IO direction '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A catalog entry describing a reusable node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: DbId,
    pub kind: DefinitionKind,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub version: String,
    pub status: DefinitionStatus,
    pub config_schema: Value,
    /// Raw pricing metadata; see [`crate::pricing::PricingConfig`].
    pub pricing: Option<Value>,
    pub archived_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A typed input or output socket belonging to one definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoDefinition {
    pub id: DbId,
    pub definition_id: DbId,
    pub name: String,
    pub label: Option<String>,
    pub direction: IoDirection,
    pub socket_type: String,
    pub required: bool,
    pub is_list: bool,
    pub constraints: Value,
    pub sort_order: i32,
}

/// Display metadata for a socket type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketType {
    pub name: String,
    pub color: String,
}

/// A definition together with its IO rows, as returned by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDefinitionWithIo {
    #[serde(flatten)]
    pub definition: NodeDefinition,
    pub io: Vec<IoDefinition>,
}

// ---------------------------------------------------------------------------
// Input DTOs
// ---------------------------------------------------------------------------

/// Input for creating a definition. New definitions always start as drafts.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewNodeDefinition {
    pub kind: DefinitionKind,
    #[validate(length(min = 1, max = 100))]
    pub slug: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub config_schema: Value,
    pub pricing: Option<Value>,
    #[serde(default)]
    pub io: Vec<NewIoDefinition>,
}

/// An IO row as submitted by admin clients.
///
/// Flags and sort order are accepted loosely (`true`, `1`, `"1"`, `"3"`,
/// `3.0`) because clients round-trip them through form state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIoDefinition {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub direction: IoDirection,
    pub socket_type: String,
    #[serde(default, deserialize_with = "deserialize_flex_bool")]
    pub required: bool,
    #[serde(default, deserialize_with = "deserialize_flex_bool")]
    pub is_list: bool,
    #[serde(default)]
    pub constraints: Value,
    #[serde(default, deserialize_with = "deserialize_flex_i32")]
    pub sort_order: i32,
}

impl NewIoDefinition {
    /// Copy an existing row so it can be attached to another definition.
    pub fn from_existing(io: &IoDefinition) -> Self {
        Self {
            name: io.name.clone(),
            label: io.label.clone(),
            direction: io.direction,
            socket_type: io.socket_type.clone(),
            required: io.required,
            is_list: io.is_list,
            constraints: io.constraints.clone(),
            sort_order: io.sort_order,
        }
    }
}

/// Partial update for a single IO row (draft parents only).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IoPatch {
    pub name: Option<String>,
    pub label: Option<String>,
    pub direction: Option<IoDirection>,
    pub socket_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_flex_bool")]
    pub required: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_flex_bool")]
    pub is_list: Option<bool>,
    pub constraints: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_opt_flex_i32")]
    pub sort_order: Option<i32>,
}

// ---------------------------------------------------------------------------
// Loose scalar coercion
// ---------------------------------------------------------------------------

/// Interpret a JSON value as a boolean the way form clients encode them.
pub fn flex_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        Value::Null => Some(false),
        _ => None,
    }
}

/// Interpret a JSON value as an integer, truncating floats.
pub fn flex_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i32))
        }
        Value::Null => Some(0),
        _ => None,
    }
}

fn deserialize_flex_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let v = Value::deserialize(d)?;
    flex_bool(&v).ok_or_else(|| de::Error::custom(format!("expected boolean-like value, got {v}")))
}

fn deserialize_opt_flex_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    deserialize_flex_bool(d).map(Some)
}

fn deserialize_flex_i32<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let v = Value::deserialize(d)?;
    flex_i32(&v).ok_or_else(|| de::Error::custom(format!("expected integer-like value, got {v}")))
}

fn deserialize_opt_flex_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    deserialize_flex_i32(d).map(Some)
}

// ---------------------------------------------------------------------------
// Versioning helpers
// ---------------------------------------------------------------------------

/// Compute the next version by bumping the third dot component.
///
/// `1.0.0 -> 1.0.1`. With fewer than three components, or a non-numeric
/// third component, `.1` is appended instead.
pub fn next_version(current: &str) -> String {
    let current = current.trim();
    if current.is_empty() {
        return DEFAULT_VERSION.to_string();
    }
    let mut parts: Vec<String> = current.split('.').map(str::to_string).collect();
    if parts.len() < 3 {
        return format!("{current}.1");
    }
    match parts[2].parse::<u64>() {
        Ok(patch) => {
            parts[2] = (patch + 1).to_string();
            parts.join(".")
        }
        Err(_) => format!("{current}.1"),
    }
}

/// Unwrap a JSON document that arrived as a JSON-encoded string.
///
/// Strings that do not parse are kept as-is. `null` is treated as an
/// empty object so absent and empty schemas compare equal.
pub fn normalize_json_document(value: &Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) if !parsed.is_string() => normalize_json_document(&parsed),
            _ => value.clone(),
        },
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Whether two config schemas differ in content, ignoring key order,
/// whitespace and JSON-in-a-string encoding.
pub fn schema_changed(stored: &Value, incoming: &Value) -> bool {
    canonical_json(&normalize_json_document(stored))
        != canonical_json(&normalize_json_document(incoming))
}

/// Order- and format-insensitive projection of one IO row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalIo {
    pub name: String,
    pub direction: IoDirection,
    pub socket_type: String,
    pub required: u8,
    pub is_list: u8,
    pub sort_order: i32,
    pub constraints: String,
}

impl CanonicalIo {
    fn new(
        name: &str,
        direction: IoDirection,
        socket_type: &str,
        required: bool,
        is_list: bool,
        sort_order: i32,
        constraints: &Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            direction,
            socket_type: socket_type.to_string(),
            required: u8::from(required),
            is_list: u8::from(is_list),
            sort_order,
            constraints: canonical_json(&normalize_json_document(constraints)),
        }
    }
}

impl From<&IoDefinition> for CanonicalIo {
    fn from(io: &IoDefinition) -> Self {
        Self::new(
            &io.name,
            io.direction,
            &io.socket_type,
            io.required,
            io.is_list,
            io.sort_order,
            &io.constraints,
        )
    }
}

impl From<&NewIoDefinition> for CanonicalIo {
    fn from(io: &NewIoDefinition) -> Self {
        Self::new(
            &io.name,
            io.direction,
            &io.socket_type,
            io.required,
            io.is_list,
            io.sort_order,
            &io.constraints,
        )
    }
}

/// Canonical, name-sorted IO set.
pub fn canonical_io_set<'a, T>(rows: impl IntoIterator<Item = &'a T>) -> Vec<CanonicalIo>
where
    T: 'a,
    CanonicalIo: From<&'a T>,
{
    let mut set: Vec<CanonicalIo> = rows.into_iter().map(CanonicalIo::from).collect();
    set.sort();
    set
}

/// Whether an incoming IO set differs from the stored one in anything but
/// formatting.
pub fn io_set_changed(stored: &[IoDefinition], incoming: &[NewIoDefinition]) -> bool {
    canonical_io_set(stored) != canonical_io_set(incoming)
}
