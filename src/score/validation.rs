//! Schema-driven validation of untyped JSON request bodies.
//!
//! A [`Schema`] lists field rules in declaration order plus an optional
//! "at least one of" rule. [`validate`] checks a payload against it, builds a
//! normalized object (unknown keys dropped, integral floats coerced) and
//! deserializes that into the typed request.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer strictly greater than zero
    PositiveInt,
    String,
    /// String holding a UUID
    #[allow(dead_code)]
    Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldRule {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        FieldRule {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        FieldRule {
            name,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [FieldRule],
    /// Field names of which at least one must be present, and the message
    /// reported otherwise.
    pub at_least_one_of: Option<(&'static [&'static str], &'static str)>,
}

/// One violated constraint. `field` is `None` for object-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    fn field(name: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: Some(name.to_string()),
            message: message.into(),
        }
    }

    fn object(message: impl Into<String>) -> Self {
        ValidationError {
            field: None,
            message: message.into(),
        }
    }
}

/// Ordered list of validation failures for one payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed with {} error(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn single(message: impl Into<String>) -> Self {
        ValidationErrors {
            errors: vec![ValidationError::object(message)],
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check one field value, pushing any violations. Returns the normalized value
/// when the field is valid.
fn check_field(rule: &FieldRule, value: &Value, errors: &mut Vec<ValidationError>) -> Option<Value> {
    match rule.kind {
        FieldKind::PositiveInt => {
            let Value::Number(n) = value else {
                errors.push(ValidationError::field(
                    rule.name,
                    format!("Expected number, received {}", type_name(value)),
                ));
                return None;
            };
            if let Some(u) = n.as_u64() {
                if u == 0 {
                    errors.push(ValidationError::field(rule.name, "Number must be greater than 0"));
                    return None;
                }
                return Some(Value::Number(Number::from(u)));
            }
            if n.as_i64().is_some() {
                errors.push(ValidationError::field(rule.name, "Number must be greater than 0"));
                return None;
            }
            let f = n.as_f64().unwrap_or(f64::NAN);
            let mut valid = true;
            if !f.is_finite() || f.fract() != 0.0 {
                errors.push(ValidationError::field(rule.name, "Expected integer, received float"));
                valid = false;
            }
            if f <= 0.0 {
                errors.push(ValidationError::field(rule.name, "Number must be greater than 0"));
                valid = false;
            }
            // u64::MAX rounds up to 2^64 as f64, so anything at or above it overflows
            if valid && f >= u64::MAX as f64 {
                errors.push(ValidationError::field(
                    rule.name,
                    format!("Number must be less than or equal to {}", u64::MAX),
                ));
                valid = false;
            }
            if !valid {
                return None;
            }
            Some(Value::Number(Number::from(f as u64)))
        }
        FieldKind::String => match value {
            Value::String(_) => Some(value.clone()),
            other => {
                errors.push(ValidationError::field(
                    rule.name,
                    format!("Expected string, received {}", type_name(other)),
                ));
                None
            }
        },
        FieldKind::Uuid => match value {
            Value::String(s) if uuid::Uuid::parse_str(s).is_ok() => Some(value.clone()),
            Value::String(_) => {
                errors.push(ValidationError::field(rule.name, "Invalid uuid"));
                None
            }
            other => {
                errors.push(ValidationError::field(
                    rule.name,
                    format!("Expected string, received {}", type_name(other)),
                ));
                None
            }
        },
    }
}

/// Validate `payload` against `schema` and deserialize the normalized result.
///
/// Errors are reported in the order the schema declares its fields; the
/// "at least one of" error comes last and is reported whenever none of its
/// fields is present.
pub fn validate<T: DeserializeOwned>(schema: &Schema, payload: &Value) -> Result<T, ValidationErrors> {
    let Some(object) = payload.as_object() else {
        return Err(ValidationErrors::single(format!(
            "Expected object, received {}",
            type_name(payload)
        )));
    };

    let mut errors = Vec::new();
    let mut normalized = Map::new();

    for rule in schema.fields {
        match object.get(rule.name) {
            None if rule.required => errors.push(ValidationError::field(rule.name, "Required")),
            None => {}
            Some(value) => {
                if let Some(v) = check_field(rule, value, &mut errors) {
                    normalized.insert(rule.name.to_string(), v);
                }
            }
        }
    }

    if let Some((names, message)) = schema.at_least_one_of {
        if !names.iter().any(|name| object.contains_key(*name)) {
            errors.push(ValidationError::object(message));
        }
    }

    if !errors.is_empty() {
        return Err(ValidationErrors { errors });
    }

    serde_json::from_value(Value::Object(normalized))
        .map_err(|e| ValidationErrors::single(e.to_string()))
}
