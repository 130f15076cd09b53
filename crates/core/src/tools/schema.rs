//! Parameter schemas for tool arguments.
//!
//! A schema is an ordered list of fields with a primitive kind and optional
//! constraints. `validate` coerces loosely-typed model output (numeric strings,
//! `"true"`/`"false"`, whole floats for integers) and rejects everything else
//! with a field-level `ValidationError`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// RFC 3339 timestamp carried as a string.
    Timestamp,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Timestamp => "timestamp",
            Self::Any => "any",
        }
    }

    fn json_schema_type(&self) -> Option<&'static str> {
        match self {
            Self::String | Self::Timestamp => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Any => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Constraint {
    Positive,
    NonNegative,
    MinLength { min: usize },
    MaxLength { max: usize },
    OneOf { values: Vec<String> },
    Range { min: f64, max: f64 },
}

impl Constraint {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Positive => match value.as_f64() {
                Some(number) if number > 0.0 => Ok(()),
                _ => Err("must be positive".to_string()),
            },
            Self::NonNegative => match value.as_f64() {
                Some(number) if number >= 0.0 => Ok(()),
                _ => Err("must not be negative".to_string()),
            },
            Self::MinLength { min } => match length_of(value) {
                Some(length) if length >= *min => Ok(()),
                _ => Err(format!("must have at least {min} characters or items")),
            },
            Self::MaxLength { max } => match length_of(value) {
                Some(length) if length <= *max => Ok(()),
                _ => Err(format!("must have at most {max} characters or items")),
            },
            Self::OneOf { values } => match value.as_str() {
                Some(text) if values.iter().any(|allowed| allowed == text) => Ok(()),
                _ => Err(format!("must be one of {}", values.join("|"))),
            },
            Self::Range { min, max } => match value.as_f64() {
                Some(number) if number >= *min && number <= *max => Ok(()),
                _ => Err(format!("must be within {min}..={max}")),
            },
        }
    }

    fn annotate(&self, schema: &mut Map<String, Value>) {
        match self {
            Self::Positive => {
                schema.insert("exclusiveMinimum".to_string(), json!(0));
            }
            Self::NonNegative => {
                schema.insert("minimum".to_string(), json!(0));
            }
            Self::MinLength { min } => {
                schema.insert("minLength".to_string(), json!(min));
            }
            Self::MaxLength { max } => {
                schema.insert("maxLength".to_string(), json!(max));
            }
            Self::OneOf { values } => {
                schema.insert("enum".to_string(), json!(values));
            }
            Self::Range { min, max } => {
                schema.insert("minimum".to_string(), json!(min));
                schema.insert("maximum".to_string(), json!(max));
            }
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { required: false, ..Self::required(name, kind) }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum ValidationProblem {
    Missing,
    WrongType { expected: String },
    Constraint { detail: String },
    UnknownField,
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("is required"),
            Self::WrongType { expected } => write!(f, "expected {expected}"),
            Self::Constraint { detail } => f.write_str(detail),
            Self::UnknownField => f.write_str("is not a recognised parameter"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: ValidationProblem,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid arguments: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, problem: ValidationProblem) -> Self {
        Self { issues: vec![FieldIssue { field: field.into(), problem }] }
    }

    pub fn has_issue_for(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("`{}` {}", issue.field, issue.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    fields: Vec<FieldSpec>,
    #[serde(default)]
    allow_unknown: bool,
}

impl ParameterSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Pass undeclared arguments through untouched instead of rejecting them.
    pub fn allow_unknown_fields(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        let mut issues = Vec::new();
        let mut validated = Map::new();

        for spec in &self.fields {
            let raw = arguments.get(&spec.name).filter(|value| !value.is_null());
            let Some(raw) = raw else {
                if spec.required {
                    issues.push(FieldIssue {
                        field: spec.name.clone(),
                        problem: ValidationProblem::Missing,
                    });
                }
                continue;
            };

            let Some(value) = coerce(spec.kind, raw) else {
                issues.push(FieldIssue {
                    field: spec.name.clone(),
                    problem: ValidationProblem::WrongType { expected: spec.kind.as_str().to_string() },
                });
                continue;
            };

            let violations: Vec<String> =
                spec.constraints.iter().filter_map(|constraint| constraint.check(&value).err()).collect();
            if violations.is_empty() {
                validated.insert(spec.name.clone(), value);
            } else {
                for detail in violations {
                    issues.push(FieldIssue {
                        field: spec.name.clone(),
                        problem: ValidationProblem::Constraint { detail },
                    });
                }
            }
        }

        for (name, value) in arguments {
            if self.fields.iter().any(|spec| &spec.name == name) {
                continue;
            }
            if self.allow_unknown {
                validated.insert(name.clone(), value.clone());
            } else {
                issues.push(FieldIssue { field: name.clone(), problem: ValidationProblem::UnknownField });
            }
        }

        if issues.is_empty() {
            Ok(validated)
        } else {
            Err(ValidationError { issues })
        }
    }

    /// JSON Schema rendering handed to the model alongside the tool name.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for spec in &self.fields {
            let mut property = Map::new();
            if let Some(kind) = spec.kind.json_schema_type() {
                property.insert("type".to_string(), json!(kind));
            }
            if spec.kind == FieldKind::Timestamp {
                property.insert("format".to_string(), json!("date-time"));
            }
            if !spec.description.is_empty() {
                property.insert("description".to_string(), json!(spec.description));
            }
            for constraint in &spec.constraints {
                constraint.annotate(&mut property);
            }
            properties.insert(spec.name.clone(), Value::Object(property));
            if spec.required {
                required.push(json!(spec.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.allow_unknown,
        })
    }
}

fn coerce(kind: FieldKind, raw: &Value) -> Option<Value> {
    match kind {
        FieldKind::Any => Some(raw.clone()),
        FieldKind::String => raw.as_str().map(|text| Value::String(text.trim().to_string())),
        FieldKind::Boolean => match raw {
            Value::Bool(flag) => Some(Value::Bool(*flag)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        FieldKind::Integer => match raw {
            Value::Number(number) => integer_from_number(number),
            Value::String(text) => text.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        FieldKind::Number => match raw {
            Value::Number(number) => Some(Value::Number(number.clone())),
            Value::String(text) => {
                let text = text.trim();
                if let Ok(integer) = text.parse::<i64>() {
                    Some(Value::from(integer))
                } else {
                    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
                }
            }
            _ => None,
        },
        FieldKind::Object => raw.is_object().then(|| raw.clone()),
        FieldKind::Array => raw.is_array().then(|| raw.clone()),
        FieldKind::Timestamp => raw.as_str().and_then(|text| {
            DateTime::parse_from_rfc3339(text.trim()).ok().map(|timestamp| {
                Value::String(
                    timestamp.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true),
                )
            })
        }),
    }
}

fn integer_from_number(number: &Number) -> Option<Value> {
    if let Some(integer) = number.as_i64() {
        return Some(Value::from(integer));
    }
    let float = number.as_f64()?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        Some(Value::from(float as i64))
    } else {
        None
    }
}
