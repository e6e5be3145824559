//! 单 Agent 运行器
//!
//! Agent = 名称 + 系统提示词 + 模型 + 工具集 + 步数 / 采样参数，构建后不可变，可在多次运行间共享。
//! run 对一次输入跑多步生成循环并返回 RunResult；stream 在后台任务中运行，
//! 通过 AgentStream 逐个产出 AgentChunk，结束后仍可取得完整 RunResult。
//! 每次运行开一个根 span（有父 span 时挂在其下）；拥有 trace 的运行在所有退出路径上 flush。

use std::io::Write;
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::AgentSection;
use crate::core::{AgentError, ExecutionContext};
use crate::llm::{ChatMessage, FinishReason, ModelRef, Usage};
use crate::memory::{Message, Role};
use crate::observability::{SpanId, SpanStatus};
use crate::react::{
    generate, AgentChunk, CompletionSummary, GenerateOutcome, GenerateSession, ToolCallRecord,
    ToolResultRecord,
};
use crate::tools::{Tool, ToolExecutor, ToolKind, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 3;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// 不可变的 Agent 配置
#[derive(Debug)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: String,
    pub model: ModelRef,
    pub max_steps: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 结构化输出模式：以终止型工具的参数作为结果
    pub structured_output: bool,
}

/// Agent 构建器；所有校验在 build 时进行
pub struct AgentBuilder {
    name: String,
    system_prompt: String,
    model: ModelRef,
    tools: ToolRegistry,
    errors: Vec<String>,
    max_steps: usize,
    temperature: f32,
    max_tokens: u32,
    structured_output: bool,
}

impl AgentBuilder {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.errors.push(e);
        }
        self
    }

    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    /// 叠加配置文件中的覆盖项（模型除外，模型由调用方解析）
    pub fn apply(mut self, section: &AgentSection) -> Self {
        if let Some(prompt) = &section.system_prompt {
            self.system_prompt = prompt.clone();
        }
        if let Some(n) = section.max_steps {
            self.max_steps = n;
        }
        if let Some(t) = section.temperature {
            self.temperature = t;
        }
        if let Some(n) = section.max_tokens {
            self.max_tokens = n;
        }
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let invalid = |reason: String| AgentError::InvalidAgent {
            agent: self.name.clone(),
            reason,
        };
        if let Some(e) = self.errors.first() {
            return Err(invalid(e.clone()));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1".to_string()));
        }
        if self.structured_output && self.tools.is_empty() {
            return Err(invalid(
                "structured output requires at least one tool".to_string(),
            ));
        }
        let has_terminal = self
            .tools
            .tool_names()
            .iter()
            .filter_map(|n| self.tools.get(n))
            .any(|t| t.kind() == ToolKind::Terminal);
        if self.structured_output && !has_terminal {
            tracing::warn!(agent = %self.name, "structured output without a terminal tool, last tool call args will be used");
        }

        Ok(Agent {
            config: Arc::new(AgentConfig {
                name: self.name,
                system_prompt: self.system_prompt,
                model: self.model,
                max_steps: self.max_steps,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                structured_output: self.structured_output,
            }),
            tools: Arc::new(self.tools),
        })
    }
}

/// 运行输出：普通文本模式或结构化模式
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RunOutput {
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        tool_results: Vec<ToolResultRecord>,
    },
    #[serde(rename_all = "camelCase")]
    Structured { value: Option<Value> },
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub agent: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub output: RunOutput,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub steps: usize,
}

impl RunResult {
    /// 文本模式下最后一步的文本
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            RunOutput::Text { text, .. } => Some(text.as_str()),
            RunOutput::Structured { .. } => None,
        }
    }

    pub fn tool_results(&self) -> &[ToolResultRecord] {
        match &self.output {
            RunOutput::Text { tool_results, .. } => tool_results,
            RunOutput::Structured { .. } => &[],
        }
    }

    /// 第一个成功的工具结果
    pub fn first_tool_result(&self) -> Option<&Value> {
        self.tool_results()
            .iter()
            .find(|r| !r.is_error)
            .map(|r| &r.result)
    }

    pub fn structured_output(&self) -> Option<&Value> {
        match &self.output {
            RunOutput::Structured { value } => value.as_ref(),
            RunOutput::Text { .. } => None,
        }
    }
}

/// 可共享的 Agent 句柄
#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    tools: Arc<ToolRegistry>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("model", &self.config.model.id())
            .field("tools", &self.tools.tool_names())
            .finish()
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: ModelRef) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            system_prompt: String::new(),
            model,
            tools: ToolRegistry::new(),
            errors: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            structured_output: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// 对一次输入运行 Agent；history 只读
    pub async fn run(
        &self,
        history: &[Message],
        input: &str,
        ctx: &ExecutionContext,
    ) -> Result<RunResult, AgentError> {
        self.run_with_events(history, input, ctx, None).await
    }

    /// 在后台任务中运行，流式产出事件
    pub fn stream(
        &self,
        history: Vec<Message>,
        input: impl Into<String>,
        ctx: ExecutionContext,
    ) -> AgentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = self.clone();
        let input = input.into();
        let handle =
            tokio::spawn(
                async move { agent.run_with_events(&history, &input, &ctx, Some(&tx)).await },
            );
        AgentStream {
            rx,
            handle,
            finished: false,
        }
    }

    async fn run_with_events(
        &self,
        history: &[Message],
        input: &str,
        ctx: &ExecutionContext,
        event_tx: Option<&UnboundedSender<AgentChunk>>,
    ) -> Result<RunResult, AgentError> {
        let cfg = &self.config;
        let span = ctx
            .sink
            .start_span(
                &cfg.name,
                ctx.parent.as_ref(),
                json!({
                    "system": cfg.system_prompt,
                    "input": input,
                    "model": cfg.model.id(),
                    "tools": self.tools.tool_names(),
                    "historyLength": history.len(),
                }),
            )
            .await;

        let result = self
            .drive(history, input, ctx, &span, event_tx)
            .await
            .map(|outcome| self.to_result(outcome));

        match &result {
            Ok(run) => {
                tracing::info!(
                    agent = %cfg.name,
                    steps = run.steps,
                    finish_reason = ?run.finish_reason,
                    total_tokens = run.usage.total(),
                    "agent run finished"
                );
                let output = serde_json::to_value(run).unwrap_or(Value::Null);
                ctx.sink.end_span(&span, output, SpanStatus::Success).await;
            }
            Err(e) => {
                tracing::warn!(agent = %cfg.name, error = %e, "agent run failed");
                ctx.sink
                    .end_span(&span, json!({ "error": e.to_string() }), SpanStatus::Error)
                    .await;
            }
        }
        ctx.flush_if_owner().await;

        if let Some(tx) = event_tx {
            let last = match &result {
                Ok(run) => AgentChunk::AgentComplete(CompletionSummary {
                    agent: cfg.name.clone(),
                    finish_reason: run.finish_reason,
                    usage: run.usage,
                    steps: run.steps,
                }),
                Err(e) => AgentChunk::Error(e.to_string()),
            };
            let _ = tx.send(last);
        }
        result
    }

    async fn drive(
        &self,
        history: &[Message],
        input: &str,
        ctx: &ExecutionContext,
        span: &SpanId,
        event_tx: Option<&UnboundedSender<AgentChunk>>,
    ) -> Result<GenerateOutcome, AgentError> {
        let cfg = &self.config;
        let mut messages: Vec<ChatMessage> = history.iter().map(to_chat_message).collect();
        messages.push(ChatMessage::User {
            content: input.to_string(),
        });

        let executor = ToolExecutor::new(
            Arc::clone(&self.tools),
            ctx.cache.clone().unwrap_or_default(),
            ctx.tool_timeout_secs,
        )
        .with_trace(ctx.sink.clone(), Some(span.clone()))
        .with_cancel(ctx.cancel.clone());

        generate(GenerateSession {
            agent: &cfg.name,
            model: &cfg.model,
            system: &cfg.system_prompt,
            messages,
            executor: &executor,
            max_steps: cfg.max_steps,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            sink: &ctx.sink,
            span: Some(span),
            cancel: &ctx.cancel,
            event_tx,
        })
        .await
    }

    fn to_result(&self, outcome: GenerateOutcome) -> RunResult {
        let output = if self.config.structured_output {
            // 没有终止型工具时退回最后一次工具调用的参数
            let value = outcome
                .terminal
                .or_else(|| outcome.tool_calls.last().map(|c| c.args.clone()));
            RunOutput::Structured { value }
        } else {
            RunOutput::Text {
                text: outcome.text,
                tool_results: outcome.tool_results,
            }
        };
        RunResult {
            agent: self.config.name.clone(),
            tool_calls: outcome.tool_calls,
            output,
            finish_reason: outcome.finish_reason,
            usage: outcome.usage,
            steps: outcome.steps,
        }
    }
}

fn to_chat_message(m: &Message) -> ChatMessage {
    match m.role {
        Role::User => ChatMessage::User {
            content: m.content.clone(),
        },
        Role::Assistant => ChatMessage::Assistant {
            content: Some(m.content.clone()),
            tool_calls: Vec::new(),
        },
        Role::System => ChatMessage::System {
            content: m.content.clone(),
        },
    }
}

/// 流式运行句柄：逐个取事件，最后一个事件为 agent-complete 或 error
pub struct AgentStream {
    rx: UnboundedReceiver<AgentChunk>,
    handle: JoinHandle<Result<RunResult, AgentError>>,
    finished: bool,
}

impl AgentStream {
    /// 下一个事件；流结束后返回 None
    pub async fn next(&mut self) -> Option<AgentChunk> {
        if self.finished {
            return None;
        }
        let chunk = self.rx.recv().await;
        match &chunk {
            Some(c) if !c.is_final() => {}
            _ => self.finished = true,
        }
        chunk
    }

    /// 等待后台任务结束并取得完整结果
    pub async fn finish(self) -> Result<RunResult, AgentError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AgentError::TaskFailed(e.to_string())),
        }
    }

    /// 把文本事件写到 out（逐段 flush），返回完整结果
    pub async fn run<W: Write>(mut self, out: &mut W) -> Result<RunResult, AgentError> {
        while let Some(chunk) = self.next().await {
            if let AgentChunk::Text(text) = chunk {
                if let Err(e) = write!(out, "{text}").and_then(|_| out.flush()) {
                    tracing::warn!(error = %e, "failed to write streamed text");
                }
            }
        }
        self.finish().await
    }

    /// 转为 futures Stream（只关心事件、不需要最终结果时）
    pub fn into_stream(self) -> impl Stream<Item = AgentChunk> + Send {
        futures_util::stream::unfold(self, |mut s| async move {
            let chunk = s.next().await?;
            Some((chunk, s))
        })
    }
}
