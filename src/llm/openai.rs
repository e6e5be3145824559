//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 请求 / 响应使用自定义 serde 类型（byot），以便携带 tools 与 tool_calls。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{
    ChatMessage, FinishReason, LanguageModel, LlmError, StepRequest, StepResponse, ToolCall, Usage,
};

/// OpenAI 兼容客户端：持有 Client、模型名与请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    id: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        id: impl Into<String>,
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            id: id.into(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 拼接 chat.completions 请求体
    fn build_request(&self, request: &StepRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({ "role": "system", "content": request.system }));
        messages.extend(request.messages.iter().map(to_openai_message));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn to_openai_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System { content } => json!({ "role": "system", "content": content }),
        ChatMessage::User { content } => json!({ "role": "user", "content": content }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                msg["tool_calls"] = Value::Array(
                    tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            msg
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
        } => json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content }),
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<CompletionToolCall> for ToolCall {
    fn from(call: CompletionToolCall) -> Self {
        // 参数不是合法 JSON 时原样保留为字符串，交由工具校验报错并反馈给模型
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments));
        ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &StepRequest) -> Result<StepResponse, LlmError> {
        let body = self.build_request(request);

        let response: CompletionResponse =
            tokio::time::timeout(self.timeout, self.client.chat().create_byot(body))
                .await
                .map_err(|_| LlmError::Request(format!("timed out after {:?}", self.timeout)))?
                .map_err(|e| LlmError::Request(e.to_string()))?;

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

        Ok(StepResponse {
            text: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(ToolCall::from)
                .collect(),
            finish_reason: FinishReason::from_openai(choice.finish_reason.as_deref()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDeclaration;

    fn client() -> OpenAiClient {
        OpenAiClient::new("openai:gpt-4o-mini", None, "gpt-4o-mini", "sk-test", 30)
    }

    #[test]
    fn test_build_request_includes_tools_and_history() {
        let request = StepRequest {
            system: "be brief".to_string(),
            messages: vec![
                ChatMessage::User {
                    content: "hi".to_string(),
                },
                ChatMessage::Assistant {
                    content: None,
                    tool_calls: vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "echo".to_string(),
                        arguments: json!({"text": "hi"}),
                    }],
                },
                ChatMessage::Tool {
                    tool_call_id: "call_1".to_string(),
                    content: "\"hi\"".to_string(),
                },
            ],
            tools: vec![ToolDeclaration {
                name: "echo".to_string(),
                description: "Echo text".to_string(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.2,
            max_tokens: 64,
        };

        let body = client().build_request(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"text\":\"hi\"}"
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
    }

    #[test]
    fn test_build_request_omits_empty_tools() {
        let request = StepRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
            temperature: 0.7,
            max_tokens: 16,
        };
        let body = client().build_request(&request);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_call_with_malformed_arguments_kept_as_string() {
        let call: ToolCall = CompletionToolCall {
            id: "c".to_string(),
            function: CompletionFunction {
                name: "echo".to_string(),
                arguments: "{not json".to_string(),
            },
        }
        .into();
        assert_eq!(call.arguments, Value::String("{not json".to_string()));
    }
}
