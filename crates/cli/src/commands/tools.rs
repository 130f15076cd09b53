use switchyard_core::config::LoadOptions;

use crate::commands::{with_application, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    with_application("tools", options, |app| async move {
        let catalogue = app.runtime.describe_tools();
        let count = catalogue.as_array().map(Vec::len).unwrap_or_default();
        CommandResult::success_with_data(
            "tools",
            format!("{count} tool(s) registered"),
            Some(catalogue),
        )
    })
}
