//! Agent 错误类型
//!
//! 工具 / 生成引擎 / 取消等错误一律向上传播；仅 Trace 后端自身的失败在 ResilientSink 内被吸收。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// 工具参数未通过 schema 校验（未触碰缓存与工具本身）
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// 模型调用了未声明的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {tool} failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 外部取消信号触发，区别于生成错误
    #[error("Cancelled")]
    Cancelled,

    /// Agent 构建期校验失败（工具重名、max_steps 为 0 等）
    #[error("Invalid agent {agent}: {reason}")]
    InvalidAgent { agent: String, reason: String },

    /// 模型标识无法解析（未知 provider、格式错误）
    #[error("Config error: {0}")]
    Config(String),

    /// 后台运行任务异常退出（panic 或被中止）
    #[error("Agent task failed: {0}")]
    TaskFailed(String),
}

impl AgentError {
    /// 是否为可反馈给模型、由模型自行纠正的工具级错误
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidArguments { .. }
                | AgentError::UnknownTool(_)
                | AgentError::ToolExecutionFailed { .. }
                | AgentError::ToolTimeout(_)
        )
    }
}
