//! Quill - Rust 多智能体内容创作管线
//!
//! 模块划分：
//! - **agent**: 单 Agent 运行器（多步生成、结构化输出、流式事件）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行上下文、路由决策、流水线编排、优雅关闭
//! - **llm**: 生成引擎抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话历史
//! - **observability**: 日志初始化与容错 Trace Sink
//! - **react**: 多步生成循环与流式事件
//! - **tools**: 工具注册、参数校验、记忆化执行与内容工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{Agent, AgentStream, RunOutput, RunResult};
pub use core::{AgentError, ContentPipeline, ExecutionContext, OrchestrationResult, PipelineError};
