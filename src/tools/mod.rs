// Tool surface exposed to the model
//
// Three tools, declared with Claude-API-compatible schemas and dispatched
// through a closed enum so adding a tool forces updates to both the schema
// list and every match site.

pub mod schema;

pub use schema::{
    builtin_tools, display_text, ToolDefinition, ToolInputSchema, ToolKind, Timeouts,
};
