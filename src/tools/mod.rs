//! 工具层：Tool trait 与注册表、参数 schema、结果缓存、记忆化执行器、内容创作工具

pub mod cache;
pub mod content;
pub mod executor;
pub mod registry;
pub mod schema;

pub use cache::{cache_key, canonicalize, ToolCache};
pub use content::{route_request_tool, FormatTool, PublishTool, ResearchTool, StrategyTool};
pub use executor::{ToolExecutor, ToolOutcome};
pub use registry::{Tool, ToolKind, ToolRegistry};
pub use schema::{normalize_args, parse_args, schema_of, AnswerTool, TypedTool};
