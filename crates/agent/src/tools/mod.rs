//! Built-in tools
//!
//! The tool set an embedding application gets out of the box: conversation
//! memory, expense records, scheduling, and an echo tool. Every tool is a
//! [`ToolHandler`] bound to a [`ToolDefinition`] in the shared registry.
//!
//! [`ToolHandler`]: switchyard_core::ToolHandler
//! [`ToolDefinition`]: switchyard_core::ToolDefinition

use serde_json::{Map, Value};

use switchyard_core::config::ToolsConfig;
use switchyard_core::{RegistryError, ToolError, ToolRegistry};

pub mod echo;
pub mod expenses;
pub mod memory;
pub mod scheduling;

pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    config: &ToolsConfig,
) -> Result<(), RegistryError> {
    memory::register(registry)?;
    expenses::register(registry, config)?;
    scheduling::register(registry)?;
    echo::register(registry)?;
    Ok(())
}

pub fn builtin_registry(config: &ToolsConfig) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, config)?;
    Ok(registry)
}

fn required_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Invalid(format!("`{name}` must be a string")))
}

fn optional_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    arguments.get(name).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use switchyard_core::config::ToolsConfig;
    use switchyard_core::ExecutionMode;

    use super::builtin_registry;

    #[test]
    fn builtin_catalogue_is_complete() {
        let registry = builtin_registry(&ToolsConfig::default()).expect("registry");

        assert_eq!(
            registry.tool_names(),
            vec![
                "cancel_schedule",
                "create_expense",
                "delete_expense",
                "echo",
                "forget",
                "list_expenses",
                "list_schedules",
                "recall",
                "remember",
                "schedule_task",
                "update_expense",
            ]
        );
    }

    #[test]
    fn expense_confirmation_switch_controls_mutating_tools() {
        let guarded = builtin_registry(&ToolsConfig { expense_confirmation: true }).expect("registry");
        let open = builtin_registry(&ToolsConfig { expense_confirmation: false }).expect("registry");

        for name in ["create_expense", "update_expense", "delete_expense"] {
            assert_eq!(guarded.resolve(name).expect("tool").mode, ExecutionMode::Confirm);
            assert_eq!(open.resolve(name).expect("tool").mode, ExecutionMode::Auto);
        }
        assert_eq!(guarded.resolve("list_expenses").expect("tool").mode, ExecutionMode::Auto);
    }

    #[test]
    fn every_tool_describes_its_parameters() {
        let registry = builtin_registry(&ToolsConfig::default()).expect("registry");
        let described = registry.describe();
        let tools = described.as_array().expect("array");

        assert_eq!(tools.len(), registry.len());
        assert!(tools.iter().all(|tool| tool["parameters"]["type"] == "object"));
    }
}
