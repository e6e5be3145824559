//! 生成引擎抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LanguageModel：generate 完成一次模型往返。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{StepRequest, StepResponse};

/// 生成引擎错误（网络、鉴权、响应格式等）
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

/// 生成引擎 trait：一次调用 = 一步（文本和/或工具调用）
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 模型标识（provider:model），仅用于日志与 trace
    fn model_id(&self) -> &str;

    async fn generate(&self, request: &StepRequest) -> Result<StepResponse, LlmError>;
}
