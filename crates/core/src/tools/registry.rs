//! Tool registry
//!
//! Static mapping from tool name to its definition (schema + execution mode)
//! and the execution function bound by the embedding application. Populated
//! once at startup; lookups never mutate it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::tool::ToolDefinition;
use crate::tools::handler::ToolHandler;
use crate::tools::schema::ValidationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("tool `{tool}`: {source}")]
    Validation {
        tool: String,
        #[source]
        source: ValidationError,
    },
}

impl RegistryError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::DuplicateTool(_) => "duplicate_tool",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation { .. } => "validation",
        }
    }
}

#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, definition: ToolDefinition, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        self.register_shared(definition, Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name));
        }
        self.tools.insert(definition.name.clone(), RegisteredTool { definition, handler });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDefinition, RegistryError> {
        self.lookup(name).map(|tool| &tool.definition)
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.tools.get(name).ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Applies the tool's parameter schema, returning the coerced arguments.
    pub fn validate(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, RegistryError> {
        let definition = self.resolve(name)?;
        definition
            .parameters
            .validate(arguments)
            .map_err(|source| RegistryError::Validation { tool: name.to_string(), source })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool catalogue in name order, shaped for a model's tool list.
    pub fn describe(&self) -> Value {
        Value::Array(
            self.tools
                .values()
                .map(|tool| {
                    json!({
                        "name": tool.definition.name,
                        "description": tool.definition.description,
                        "mode": tool.definition.mode.as_str(),
                        "parameters": tool.definition.parameters.to_json_schema(),
                    })
                })
                .collect(),
        )
    }
}
