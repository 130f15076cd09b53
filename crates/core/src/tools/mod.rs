pub mod handler;
pub mod registry;
pub mod schema;

pub use handler::{ToolContext, ToolError, ToolHandler};
pub use registry::{RegisteredTool, RegistryError, ToolRegistry};
pub use schema::{
    Constraint, FieldIssue, FieldKind, FieldSpec, ParameterSchema, ValidationError,
    ValidationProblem,
};
