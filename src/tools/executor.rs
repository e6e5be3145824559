//! 带记忆化的工具执行器
//!
//! 每次 Agent 运行构建一个 ToolExecutor：持有工具注册表、共享缓存、超时、取消令牌与 Trace Sink。
//! execute 顺序：查找工具 -> 校验参数 -> 查缓存（命中直接返回，无 span 无日志）-> 执行并写缓存。
//! 执行失败不写缓存，下一次相同调用会重试；每次真实执行输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::observability::{ResilientSink, SpanId, SpanStatus};
use crate::tools::{cache_key, Tool, ToolCache, ToolKind, ToolRegistry};

/// 工具调用结果：普通返回值，或终止型工具的最终参数
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Value(Value),
    Terminal(Value),
}

impl ToolOutcome {
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::Value(v) | ToolOutcome::Terminal(v) => v,
        }
    }
}

/// 工具执行器：对每次调用施加校验、缓存、超时与取消
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: ToolCache,
    timeout: Duration,
    sink: ResilientSink,
    parent: Option<SpanId>,
    cancel: CancellationToken,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, cache: ToolCache, timeout_secs: u64) -> Self {
        Self {
            registry,
            cache,
            timeout: Duration::from_secs(timeout_secs),
            sink: ResilientSink::disabled(),
            parent: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 挂接 Trace：工具 span 作为 parent 的子 span
    pub fn with_trace(mut self, sink: ResilientSink, parent: Option<SpanId>) -> Self {
        self.sink = sink;
        self.parent = parent;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &ToolCache {
        &self.cache
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<ToolOutcome, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let raw = args.clone();
        let args = tool
            .validate(args)
            .map_err(|reason| AgentError::InvalidArguments {
                tool: tool_name.to_string(),
                reason,
            })?;

        // 终止型工具原样返回模型给出的参数；规范化结果只用于缓存键与执行
        if tool.kind() == ToolKind::Terminal {
            return Ok(ToolOutcome::Terminal(raw));
        }
        if !tool.cacheable() {
            return self.run(tool.as_ref(), args).await.map(ToolOutcome::Value);
        }

        let key = cache_key(tool_name, &args);
        let slot = self.cache.slot(&key);
        let mut cached = slot.lock().await;
        if let Some(value) = cached.as_ref() {
            tracing::debug!(tool = tool_name, "tool cache hit");
            return Ok(ToolOutcome::Value(value.clone()));
        }

        let value = self.run(tool.as_ref(), args).await?;
        *cached = Some(value.clone());
        Ok(ToolOutcome::Value(value))
    }

    /// 真实执行一次：span + 超时 + 取消 + 审计日志
    async fn run(&self, tool: &dyn Tool, args: Value) -> Result<Value, AgentError> {
        let name = tool.name();
        let start = Instant::now();
        tracing::info!(tool = name, "tool execution started");
        let span = self
            .sink
            .start_span(
                &format!("tool:{name}"),
                self.parent.as_ref(),
                json!({ "args": args }),
            )
            .await;
        let preview = args_preview(&args);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            r = timeout(self.timeout, tool.execute(args)) => match r {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(AgentError::ToolExecutionFailed {
                    tool: name.to_string(),
                    message,
                }),
                Err(_) => Err(AgentError::ToolTimeout(name.to_string())),
            },
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(AgentError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");

        match &result {
            Ok(value) => {
                tracing::info!(tool = name, "tool execution completed");
                self.sink
                    .end_span(&span, value.clone(), SpanStatus::Success)
                    .await;
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool execution failed");
                self.sink
                    .end_span(&span, json!({ "error": e.to_string() }), SpanStatus::Error)
                    .await;
            }
        }
        result
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
