//! 核心编排层：错误、运行上下文、路由决策、内置 Agent、流水线编排与优雅关闭

pub mod agents;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod routing;
pub mod shutdown;

pub use agents::{assistant_agent, ContentAgents};
pub use context::ExecutionContext;
pub use error::AgentError;
pub use orchestrator::{ContentPipeline, OrchestrationResult, PipelineError, Stage};
pub use routing::{Action, Platform, RoutingContext, RoutingDecision};
pub use shutdown::{
    ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason, TraceFlushCleanup,
};
