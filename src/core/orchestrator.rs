//! 内容流水线编排器
//!
//! router 决定工作流后，各阶段严格顺序执行：
//! - create_content：research -> strategy -> formatter -> publisher
//! - create_strategy：只跑 strategy
//! - manage_content：尚未实现，直接返回提示信息
//!
//! 整条流水线共享一个根 span 与一个工具缓存；每个阶段只写结果中的一个字段。
//! 某阶段没有产出工具结果时对应字段留空，流水线继续；阶段报错则整体失败并标明阶段。

use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::agent::{Agent, RunResult};
use crate::core::{Action, AgentError, ContentAgents, ExecutionContext, Platform, RoutingDecision};
use crate::observability::SpanStatus;

/// 未指定语气时的默认值
pub const DEFAULT_TONE: &str = "professional";
pub const MANAGE_CONTENT_MESSAGE: &str = "workflow not implemented";

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Router,
    Research,
    Strategy,
    Formatter,
    Publisher,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Router => "router",
            Stage::Research => "research",
            Stage::Strategy => "strategy",
            Stage::Formatter => "formatter",
            Stage::Publisher => "publisher",
        };
        f.write_str(s)
    }
}

/// 阶段失败：携带阶段名与原因
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: AgentError,
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, AgentError::Cancelled)
    }
}

/// 流水线结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub action: Action,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OrchestrationResult {
    fn new(decision: &RoutingDecision) -> Self {
        Self {
            action: decision.action,
            platform: decision.platform,
            references: None,
            strategy: None,
            formatted_content: None,
            published_content: None,
            message: None,
        }
    }
}

pub fn research_prompt(input: &str) -> String {
    format!("Research this topic: {input}")
}

pub fn strategy_prompt(input: &str, platform: Platform, research: Option<&Value>) -> String {
    let mut prompt = format!("Create a content strategy for {platform} about: {input}");
    if let Some(research) = research {
        prompt.push_str(&format!("\n\nResearch findings: {research}"));
    }
    prompt
}

pub fn formatter_prompt(content: &str, platform: Platform, tone: &str) -> String {
    json!({ "content": content, "platform": platform, "tone": tone }).to_string()
}

pub fn publisher_prompt(content: &str, metadata: &Value, platform: Platform) -> String {
    json!({ "content": content, "metadata": metadata, "platform": platform }).to_string()
}

/// strategy 结果中的语气（原样传递，包括空串）；没有 tone 字段时为 professional
pub fn tone_of(strategy: Option<&Value>) -> &str {
    strategy
        .and_then(|s| s.get("tone"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TONE)
}

/// 内容流水线
#[derive(Debug, Clone)]
pub struct ContentPipeline {
    agents: ContentAgents,
}

impl ContentPipeline {
    pub fn new(agents: ContentAgents) -> Self {
        Self { agents }
    }

    pub fn agents(&self) -> &ContentAgents {
        &self.agents
    }

    /// 处理一个顶层请求
    pub async fn run(
        &self,
        input: &str,
        ctx: &ExecutionContext,
    ) -> Result<OrchestrationResult, PipelineError> {
        let root = ctx
            .sink
            .start_span("content-pipeline", ctx.parent.as_ref(), json!({ "input": input }))
            .await;
        let stage_ctx = ctx.child(root.clone(), ctx.cache.clone().unwrap_or_default());

        let result = self.execute(input, &stage_ctx).await;
        match &result {
            Ok(out) => {
                tracing::info!(action = %out.action, platform = %out.platform, "pipeline finished");
                let output = serde_json::to_value(out).unwrap_or(Value::Null);
                ctx.sink.end_span(&root, output, SpanStatus::Success).await;
            }
            Err(e) => {
                tracing::warn!(stage = %e.stage, error = %e.source, "pipeline failed");
                ctx.sink
                    .end_span(&root, json!({ "error": e.to_string() }), SpanStatus::Error)
                    .await;
            }
        }
        ctx.flush_if_owner().await;
        result
    }

    async fn execute(
        &self,
        input: &str,
        ctx: &ExecutionContext,
    ) -> Result<OrchestrationResult, PipelineError> {
        let routed = run_stage(Stage::Router, &self.agents.router, input, ctx).await?;
        let decision = RoutingDecision::from_output(routed.structured_output());
        tracing::info!(action = %decision.action, platform = %decision.platform, "request routed");

        let mut result = OrchestrationResult::new(&decision);
        match decision.action {
            Action::CreateContent => {
                self.create_content(input, decision.platform, ctx, &mut result)
                    .await?
            }
            Action::CreateStrategy => {
                let prompt = strategy_prompt(input, decision.platform, None);
                let run = run_stage(Stage::Strategy, &self.agents.strategy, &prompt, ctx).await?;
                result.strategy = run.first_tool_result().cloned();
            }
            Action::ManageContent => {
                result.message = Some(MANAGE_CONTENT_MESSAGE.to_string());
            }
        }
        Ok(result)
    }

    async fn create_content(
        &self,
        input: &str,
        platform: Platform,
        ctx: &ExecutionContext,
        result: &mut OrchestrationResult,
    ) -> Result<(), PipelineError> {
        let research = run_stage(
            Stage::Research,
            &self.agents.research,
            &research_prompt(input),
            ctx,
        )
        .await?;
        let findings = research.first_tool_result();
        result.references = findings
            .map(|r| r.get("references").cloned().unwrap_or_else(|| r.clone()));

        let prompt = strategy_prompt(input, platform, findings);
        let strategy = run_stage(Stage::Strategy, &self.agents.strategy, &prompt, ctx).await?;
        result.strategy = strategy.first_tool_result().cloned();

        let strategy_value = result.strategy.as_ref();
        let tone = tone_of(strategy_value).to_string();
        let content = strategy_value
            .and_then(|s| s.get("content"))
            .and_then(Value::as_str)
            .unwrap_or(input)
            .to_string();
        let prompt = formatter_prompt(&content, platform, &tone);
        let formatted = run_stage(Stage::Formatter, &self.agents.formatter, &prompt, ctx).await?;
        result.formatted_content = formatted.first_tool_result().cloned();

        let formatted_value = result.formatted_content.as_ref();
        let final_content = formatted_value
            .and_then(|f| f.get("formattedContent"))
            .and_then(Value::as_str)
            .unwrap_or(&content);
        let metadata = formatted_value
            .and_then(|f| f.get("metadata"))
            .cloned()
            .unwrap_or(Value::Null);
        let prompt = publisher_prompt(final_content, &metadata, platform);
        let published = run_stage(Stage::Publisher, &self.agents.publisher, &prompt, ctx).await?;
        result.published_content = published.first_tool_result().cloned();
        Ok(())
    }
}

async fn run_stage(
    stage: Stage,
    agent: &Agent,
    prompt: &str,
    ctx: &ExecutionContext,
) -> Result<RunResult, PipelineError> {
    tracing::debug!(%stage, agent = agent.name(), "stage started");
    let run = agent
        .run(&[], prompt, ctx)
        .await
        .map_err(|source| PipelineError { stage, source })?;
    if run.first_tool_result().is_none() && run.structured_output().is_none() {
        tracing::warn!(%stage, "stage produced no tool result");
    }
    Ok(run)
}
