use async_trait::async_trait;
use serde_json::{json, Map, Value};

use switchyard_core::{
    FieldKind, FieldSpec, ParameterSchema, RegistryError, ToolContext, ToolDefinition, ToolError,
    ToolHandler, ToolRegistry,
};

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolDefinition::auto("echo", "Return the arguments unchanged.").with_parameters(
            ParameterSchema::empty()
                .field(FieldSpec::optional("message", FieldKind::String))
                .allow_unknown_fields(),
        ),
        Echo,
    )
}

pub struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        Ok(json!({
            "echo": arguments,
            "callId": ctx.call_id().0,
            "at": ctx.now().to_rfc3339(),
        }))
    }
}
