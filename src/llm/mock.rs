//! Mock 生成引擎（无需 API）
//!
//! - MockModel：回显最后一条 user 消息，不调用工具；无 API Key 时的兜底后端。
//! - ScriptedModel：按脚本逐步返回 StepResponse，并记录收到的请求，用于测试。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatMessage, LanguageModel, LlmError, StepRequest, StepResponse};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    fn model_id(&self) -> &str {
        "mock:echo"
    }

    async fn generate(&self, request: &StepRequest) -> Result<StepResponse, LlmError> {
        let last_user = last_user_content(request).unwrap_or("(no input)");
        Ok(StepResponse::text(format!("Echo from Mock: {last_user}")))
    }
}

/// 取请求中最后一条 user 消息
pub fn last_user_content(request: &StepRequest) -> Option<&str> {
    request.messages.iter().rev().find_map(|m| match m {
        ChatMessage::User { content } => Some(content.as_str()),
        _ => None,
    })
}

type Responder = dyn Fn(&StepRequest, usize) -> Result<StepResponse, LlmError> + Send + Sync;

/// 脚本化模型：每次 generate 弹出一条预设响应；脚本耗尽后返回空文本 + Stop
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<StepResponse, LlmError>>>,
    responder: Option<Box<Responder>>,
    requests: Arc<Mutex<Vec<StepRequest>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<StepResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            responder: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 以闭包生成响应，参数为请求与第几次调用（从 0 开始）
    pub fn from_fn(
        f: impl Fn(&StepRequest, usize) -> Result<StepResponse, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 在脚本末尾追加一次失败
    pub fn then_fail(self, err: LlmError) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
        self
    }

    /// 共享的请求记录句柄（模型被 ModelRef 包装后仍可读取）
    pub fn recorder(&self) -> Arc<Mutex<Vec<StepRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "mock:scripted"
    }

    async fn generate(&self, request: &StepRequest) -> Result<StepResponse, LlmError> {
        let index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|e| LlmError::Request(e.to_string()))?;
            requests.push(request.clone());
            requests.len() - 1
        };

        if let Some(responder) = &self.responder {
            return responder(request, index);
        }

        let next = self
            .script
            .lock()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Ok(StepResponse::text("")))
    }
}
