//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! DeepSeek 提供与 OpenAI 完全兼容的 API 接口。
//! - Base URL: https://api.deepseek.com/v1
//! - 模型: deepseek-chat (常规对话，支持工具调用), deepseek-reasoner (思考模式)

use crate::llm::OpenAiClient;

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；model 为空时使用 deepseek-chat
pub fn create_deepseek_client(model: &str, api_key: &str, timeout_secs: u64) -> OpenAiClient {
    let model = if model.is_empty() { DEEPSEEK_CHAT } else { model };
    OpenAiClient::new(
        format!("deepseek:{model}"),
        Some(DEEPSEEK_BASE_URL),
        model,
        api_key,
        timeout_secs,
    )
}
