//! Field evaluator: pure logic, no storage access.
//!
//! Each constraint kind is a row in [`CONSTRAINT_KINDS`]: the constraint key
//! found in an IO row's `constraints` object, the error code it produces, a
//! default message template, and a checker. Adding a kind means adding a row.

use regex::Regex;
use serde_json::Value;

use super::rules::{
    FieldError, FieldRule, INVALID_OPTION, MAX_LENGTH, MAX_VALUE, MIN_LENGTH, MIN_VALUE, PATTERN,
    REQUIRED,
};

const REQUIRED_MESSAGE: &str = "This field is required";

/// What a checker applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applies {
    Strings,
    Numbers,
    Any,
}

/// One constraint kind: key, error code, message template, checker.
///
/// The checker receives the constraint value and the field value and
/// returns the observed value (for `{actual}`) when the check fails.
struct ConstraintKind {
    key: &'static str,
    code: &'static str,
    template: &'static str,
    applies: Applies,
    check: fn(limit: &Value, value: &Value) -> Option<String>,
}

const CONSTRAINT_KINDS: &[ConstraintKind] = &[
    ConstraintKind {
        key: "minLength",
        code: MIN_LENGTH,
        template: "Must be at least {value} characters (got {actual})",
        applies: Applies::Strings,
        check: check_min_length,
    },
    ConstraintKind {
        key: "maxLength",
        code: MAX_LENGTH,
        template: "Must be at most {value} characters (got {actual})",
        applies: Applies::Strings,
        check: check_max_length,
    },
    ConstraintKind {
        key: "pattern",
        code: PATTERN,
        template: "Must match the pattern {value}",
        applies: Applies::Strings,
        check: check_pattern,
    },
    ConstraintKind {
        key: "min",
        code: MIN_VALUE,
        template: "Must be at least {value} (got {actual})",
        applies: Applies::Numbers,
        check: check_min_value,
    },
    ConstraintKind {
        key: "max",
        code: MAX_VALUE,
        template: "Must be at most {value} (got {actual})",
        applies: Applies::Numbers,
        check: check_max_value,
    },
    ConstraintKind {
        key: "enum",
        code: INVALID_OPTION,
        template: "Must be one of {value} (got {actual})",
        applies: Applies::Any,
        check: check_enum,
    },
];

/// Validate one configured value against its rule.
///
/// A missing or empty required value yields exactly one `REQUIRED` error and
/// nothing else is checked. A missing optional value yields no errors.
/// Otherwise every constraint kind present in the rule is evaluated
/// independently; list fields are checked element by element.
pub fn validate_field(value: Option<&Value>, rule: &FieldRule) -> Vec<FieldError> {
    if is_empty(value) {
        if rule.required {
            return vec![FieldError {
                field: rule.field.clone(),
                code: REQUIRED.to_string(),
                message: REQUIRED_MESSAGE.to_string(),
                node_id: None,
            }];
        }
        return Vec::new();
    }

    let Some(value) = value else {
        return Vec::new();
    };

    let items: Vec<&Value> = match value {
        Value::Array(items) if rule.is_list => items.iter().collect(),
        other => vec![other],
    };

    let mut errors = Vec::new();
    for kind in CONSTRAINT_KINDS {
        let Some(raw) = rule.constraints.get(kind.key) else {
            continue;
        };
        let (limit, custom_message) = split_constraint(raw);
        for item in &items {
            if !kind_applies(kind.applies, item) {
                continue;
            }
            if let Some(actual) = (kind.check)(limit, item) {
                let template = custom_message.unwrap_or(kind.template);
                errors.push(FieldError {
                    field: rule.field.clone(),
                    code: kind.code.to_string(),
                    message: render_template(template, &display(limit), &actual),
                    node_id: None,
                });
                // One error per constraint kind, even for lists.
                break;
            }
        }
    }
    errors
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn kind_applies(applies: Applies, value: &Value) -> bool {
    match applies {
        Applies::Strings => value.is_string(),
        Applies::Numbers => value.is_number(),
        Applies::Any => true,
    }
}

/// Accept both `{"minLength": 3}` and
/// `{"minLength": {"value": 3, "message": "..."}}`.
fn split_constraint(raw: &Value) -> (&Value, Option<&str>) {
    match raw {
        Value::Object(map) if map.contains_key("value") => (
            &map["value"],
            map.get("message").and_then(|m| m.as_str()),
        ),
        other => (other, None),
    }
}

/// Substitute `{value}` and `{actual}` in a message template.
pub fn render_template(template: &str, value: &str, actual: &str) -> String {
    template.replace("{value}", value).replace("{actual}", actual)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_usize(limit: &Value) -> Option<usize> {
    limit
        .as_u64()
        .or_else(|| limit.as_f64().map(|f| f.max(0.0) as u64))
        .or_else(|| limit.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|n| n as usize)
}

fn as_f64(limit: &Value) -> Option<f64> {
    limit
        .as_f64()
        .or_else(|| limit.as_str().and_then(|s| s.trim().parse().ok()))
}

fn check_min_length(limit: &Value, value: &Value) -> Option<String> {
    let s = value.as_str()?;
    let min = as_usize(limit)?;
    let len = s.chars().count();
    (len < min).then(|| len.to_string())
}

fn check_max_length(limit: &Value, value: &Value) -> Option<String> {
    let s = value.as_str()?;
    let max = as_usize(limit)?;
    let len = s.chars().count();
    (len > max).then(|| len.to_string())
}

fn check_pattern(limit: &Value, value: &Value) -> Option<String> {
    let s = value.as_str()?;
    let pattern = limit.as_str()?;
    match Regex::new(pattern) {
        Ok(re) if re.is_match(s) => None,
        Ok(_) => Some(s.to_string()),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Ignoring invalid pattern constraint");
            None
        }
    }
}

fn check_min_value(limit: &Value, value: &Value) -> Option<String> {
    let num = value.as_f64()?;
    let min = as_f64(limit)?;
    (num < min).then(|| display(value))
}

fn check_max_value(limit: &Value, value: &Value) -> Option<String> {
    let num = value.as_f64()?;
    let max = as_f64(limit)?;
    (num > max).then(|| display(value))
}

fn check_enum(limit: &Value, value: &Value) -> Option<String> {
    let allowed = limit.as_array()?;
    (!allowed.contains(value)).then(|| display(value))
}
