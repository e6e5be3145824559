//! LLM 层：生成引擎抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;
pub mod types;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{MockModel, ScriptedModel};
pub use openai::OpenAiClient;
pub use provider::{create_model_from_config, get_model, ModelRef};
pub use traits::{LanguageModel, LlmError};
pub use types::{
    ChatMessage, FinishReason, StepRequest, StepResponse, ToolCall, ToolDeclaration, Usage,
};
