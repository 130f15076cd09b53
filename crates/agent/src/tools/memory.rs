use async_trait::async_trait;
use serde_json::{json, Map, Value};

use switchyard_core::{
    Constraint, FieldKind, FieldSpec, ParameterSchema, RegistryError, ToolContext, ToolDefinition,
    ToolError, ToolHandler, ToolRegistry,
};

use super::{optional_str, required_str};

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolDefinition::auto("remember", "Store a value in conversation memory under a key.")
            .with_parameters(
                ParameterSchema::empty()
                    .field(key_field())
                    .field(FieldSpec::required("value", FieldKind::String).describe("Value to store.")),
            ),
        Remember,
    )?;
    registry.register(
        ToolDefinition::auto("forget", "Remove a key from conversation memory.")
            .with_parameters(ParameterSchema::empty().field(key_field())),
        Forget,
    )?;
    registry.register(
        ToolDefinition::auto(
            "recall",
            "Read one memory key, or the whole memory when no key is given.",
        )
        .with_parameters(
            ParameterSchema::empty()
                .field(FieldSpec::optional("key", FieldKind::String).describe("Key to read.")),
        ),
        Recall,
    )?;
    Ok(())
}

fn key_field() -> FieldSpec {
    FieldSpec::required("key", FieldKind::String)
        .describe("Memory key.")
        .constrain(Constraint::MinLength { min: 1 })
        .constrain(Constraint::MaxLength { max: 128 })
}

pub struct Remember;

#[async_trait]
impl ToolHandler for Remember {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let key = required_str(&arguments, "key")?;
        let value = required_str(&arguments, "value")?;
        let previous = ctx.memory().set(key, value);
        Ok(json!({"key": key, "value": value, "previous": previous}))
    }
}

pub struct Forget;

#[async_trait]
impl ToolHandler for Forget {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let key = required_str(&arguments, "key")?;
        let forgotten = ctx
            .memory()
            .forget(key)
            .ok_or_else(|| ToolError::NotFound(format!("memory key `{key}`")))?;
        Ok(json!({"key": key, "forgotten": forgotten}))
    }
}

pub struct Recall;

#[async_trait]
impl ToolHandler for Recall {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let memory = ctx.memory();
        match optional_str(&arguments, "key") {
            Some(key) => Ok(json!({"key": key, "value": memory.get(key)})),
            None => Ok(json!({"memory": memory.entries()})),
        }
    }
}
