//! 运行过程事件：流式输出给 CLI / HTTP 客户端
//!
//! 序列化为 `{"type": "...", "content": ...}`；每次运行最后一个事件一定是
//! agent-complete 或 error。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{FinishReason, Usage};

/// 模型发起的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// 工具调用结果；is_error 为 true 时 result 为 `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// 单步摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub step: usize,
    pub text: String,
    pub tool_calls: usize,
    pub finish_reason: FinishReason,
    pub tokens_used: Usage,
}

/// 整次运行摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub agent: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub steps: usize,
}

/// 流式事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum AgentChunk {
    /// 模型文本（按步到达）
    Text(String),
    ToolStart(ToolCallRecord),
    ToolEnd(ToolResultRecord),
    StepComplete(StepSummary),
    AgentComplete(CompletionSummary),
    /// 运行失败，之后不会再有事件
    Error(String),
}

impl AgentChunk {
    /// 是否为流的最后一个事件
    pub fn is_final(&self) -> bool {
        matches!(self, AgentChunk::AgentComplete(_) | AgentChunk::Error(_))
    }
}
