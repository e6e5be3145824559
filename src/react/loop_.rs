//! 多步生成循环
//!
//! 每一步：调用模型 -> 若有工具调用则并发执行并把结果回填为 tool 消息 -> 下一步。
//! 模型不再调用工具、调用了终止型工具或用完 max_steps 时结束。
//! 工具级错误（参数不合法、未知工具、执行失败、超时）以 `{"error": ...}` 回填给模型自行纠正；
//! 取消与生成引擎错误直接中止本次运行。

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{ChatMessage, FinishReason, ModelRef, StepRequest, Usage};
use crate::observability::{ResilientSink, SpanId};
use crate::react::{AgentChunk, StepSummary, ToolCallRecord, ToolResultRecord};
use crate::tools::{ToolExecutor, ToolOutcome};

/// 一次循环所需的全部输入
pub struct GenerateSession<'a> {
    /// Agent 名称（用于 generation 命名与日志）
    pub agent: &'a str,
    pub model: &'a ModelRef,
    pub system: &'a str,
    /// 历史 + 本次输入
    pub messages: Vec<ChatMessage>,
    pub executor: &'a ToolExecutor,
    pub max_steps: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub sink: &'a ResilientSink,
    /// 本次运行的根 span
    pub span: Option<&'a SpanId>,
    pub cancel: &'a CancellationToken,
    /// 可选：流式事件通道
    pub event_tx: Option<&'a UnboundedSender<AgentChunk>>,
}

/// 循环结果
#[derive(Debug, Clone, Default)]
pub struct GenerateOutcome {
    /// 最后一步的文本
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// 非终止型工具的结果（含回填给模型的错误）
    pub tool_results: Vec<ToolResultRecord>,
    /// 终止型工具的参数（结构化输出）
    pub terminal: Option<Value>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub steps: usize,
}

fn send_event(tx: Option<&UnboundedSender<AgentChunk>>, ev: AgentChunk) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 运行多步生成循环
pub async fn generate(session: GenerateSession<'_>) -> Result<GenerateOutcome, AgentError> {
    let GenerateSession {
        agent,
        model,
        system,
        mut messages,
        executor,
        max_steps,
        temperature,
        max_tokens,
        sink,
        span,
        cancel,
        event_tx,
    } = session;

    let tools = executor.registry().declarations();
    let mut outcome = GenerateOutcome::default();

    for step in 1..=max_steps {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let request = StepRequest {
            system: system.to_string(),
            messages: messages.clone(),
            tools: tools.clone(),
            temperature,
            max_tokens,
        };
        tracing::debug!(agent, step, model = model.id(), "step started");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = model.model().generate(&request) => r?,
        };

        outcome.steps = step;
        outcome.usage.add(response.usage);
        outcome.finish_reason = response.finish_reason;
        let step_text = response.text.clone().unwrap_or_default();
        if !step_text.is_empty() {
            send_event(event_tx, AgentChunk::Text(step_text.clone()));
        }
        outcome.text = step_text.clone();

        let calls = response.tool_calls.clone();
        let mut finished = calls.is_empty();

        if !calls.is_empty() {
            messages.push(ChatMessage::Assistant {
                content: response.text.clone(),
                tool_calls: calls.clone(),
            });
            for call in &calls {
                let record = ToolCallRecord {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                };
                send_event(event_tx, AgentChunk::ToolStart(record.clone()));
                outcome.tool_calls.push(record);
            }

            let results = join_all(
                calls
                    .iter()
                    .map(|call| executor.execute(&call.name, call.arguments.clone())),
            )
            .await;

            for (call, result) in calls.iter().zip(results) {
                let (value, is_error, terminal) = match result {
                    Ok(ToolOutcome::Value(v)) => (v, false, false),
                    Ok(ToolOutcome::Terminal(v)) => (v, false, true),
                    Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(e) if e.is_tool_error() => {
                        tracing::warn!(agent, tool = %call.name, error = %e, "tool call failed, reported to model");
                        (json!({ "error": e.to_string() }), true, false)
                    }
                    Err(e) => return Err(e),
                };
                let record = ToolResultRecord {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                    result: value.clone(),
                    is_error,
                };
                send_event(event_tx, AgentChunk::ToolEnd(record.clone()));

                if terminal {
                    // 多个终止调用时保留最后一个
                    outcome.terminal = Some(value);
                    finished = true;
                    continue;
                }
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: value.to_string(),
                });
                outcome.tool_results.push(record);
            }
        }

        sink.generation(
            &format!("{agent}:step-{step}"),
            span,
            json!({ "model": model.id(), "step": step, "messageCount": request.messages.len() }),
            Some(json!({
                "text": step_text,
                "toolCalls": calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "finishReason": response.finish_reason,
                "usage": response.usage,
            })),
        )
        .await;
        send_event(
            event_tx,
            AgentChunk::StepComplete(StepSummary {
                step,
                text: step_text,
                tool_calls: calls.len(),
                finish_reason: response.finish_reason,
                tokens_used: response.usage,
            }),
        );

        if finished {
            break;
        }
        if step == max_steps {
            tracing::info!(agent, max_steps, "step budget exhausted");
        }
    }

    Ok(outcome)
}
