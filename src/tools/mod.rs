pub mod executor;
pub mod function;
pub mod knowledge;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use function::FnTool;
pub use knowledge::{GuidelinesTool, LiveIndexTool, PastResolutionsTool};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use schema::{decision_instructions, decision_schema_json};
