//! 执行层：多步生成循环与流式事件

pub mod events;
pub mod loop_;

pub use events::{AgentChunk, CompletionSummary, StepSummary, ToolCallRecord, ToolResultRecord};
pub use loop_::{generate, GenerateOutcome, GenerateSession};
