//! 模型引用（Capability Reference）与按标识解析
//!
//! 标识约定为 `provider:model-name`，如 `openai:gpt-4o-mini`、`deepseek:deepseek-chat`、`mock:echo`。
//! ModelRef 构造后不可变，可在多个 Agent / 多次运行间共享。

use std::fmt;
use std::sync::Arc;

use crate::config::LlmSection;
use crate::llm::{create_deepseek_client, LanguageModel, LlmError, MockModel, OpenAiClient};

/// 模型引用：标识 + 共享的生成引擎句柄
#[derive(Clone)]
pub struct ModelRef {
    id: String,
    model: Arc<dyn LanguageModel>,
}

impl ModelRef {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            id: model.model_id().to_string(),
            model,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRef").field("id", &self.id).finish()
    }
}

fn api_key(var: &str) -> Result<String, LlmError> {
    std::env::var(var).map_err(|_| LlmError::MissingApiKey(var.to_string()))
}

/// 按 `provider:model` 解析模型；缺少 API Key 时返回 MissingApiKey
pub fn get_model(identifier: &str, llm: &LlmSection) -> Result<ModelRef, LlmError> {
    let (provider, name) = identifier
        .split_once(':')
        .ok_or_else(|| LlmError::UnknownProvider(identifier.to_string()))?;
    let timeout = llm.timeouts.request;

    let model: Arc<dyn LanguageModel> = match provider.to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiClient::new(
            identifier,
            llm.base_url.as_deref(),
            name,
            &api_key("OPENAI_API_KEY")?,
            timeout,
        )),
        "deepseek" => Arc::new(create_deepseek_client(
            name,
            &api_key("DEEPSEEK_API_KEY")?,
            timeout,
        )),
        "mock" => Arc::new(MockModel),
        _ => return Err(LlmError::UnknownProvider(provider.to_string())),
    };
    Ok(ModelRef {
        id: identifier.to_string(),
        model,
    })
}

/// 根据配置创建模型；缺少 API Key 时退回 Mock（与无 Key 本地跑通一致），其它错误照常返回
pub fn create_model_from_config(identifier: &str, llm: &LlmSection) -> Result<ModelRef, LlmError> {
    match get_model(identifier, llm) {
        Ok(model) => {
            tracing::info!("Using model {}", model.id());
            Ok(model)
        }
        Err(LlmError::MissingApiKey(var)) => {
            tracing::warn!("{} not set, using Mock LLM instead of {}", var, identifier);
            Ok(ModelRef::new(Arc::new(MockModel)))
        }
        Err(e) => Err(e),
    }
}
