use serde::{Deserialize, Serialize};

use crate::tools::schema::ParameterSchema;

/// Whether a tool runs as soon as the model asks for it or waits for a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Auto,
    Confirm,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Confirm => "confirm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "confirm" => Some(Self::Confirm),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub mode: ExecutionMode,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::empty(),
            mode,
        }
    }

    pub fn auto(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ExecutionMode::Auto)
    }

    pub fn confirm(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ExecutionMode::Confirm)
    }

    pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn requires_confirmation(&self) -> bool {
        self.mode == ExecutionMode::Confirm
    }
}
