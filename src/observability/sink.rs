//! 容错的 Trace Sink
//!
//! 所有对外部 Trace 后端的调用都经过 isolate：后端返回错误或 panic 时仅记一条 warn 日志，
//! 绝不影响 Agent 主流程。未配置后端时全部操作为空操作。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Span 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Running,
    Success,
    Error,
}

/// Span 标识：所属 trace + 自身 id（本地生成，后端失败时依然有效）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanId {
    pub trace_id: String,
    pub id: String,
}

/// 新建 trace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub timestamp: String,
}

/// Span 开始
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub input: Value,
    pub status: SpanStatus,
    pub start_time: String,
}

/// Span 结束（输出 + 状态）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanUpdate {
    pub id: String,
    pub trace_id: String,
    pub output: Value,
    pub status: SpanStatus,
    pub end_time: String,
}

/// 一次模型生成（每个 step 一条）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub timestamp: String,
}

/// 外部 Trace 后端；除 flush_async 外均视为 fire-and-forget
#[async_trait]
pub trait TraceBackend: Send + Sync {
    async fn trace(&self, record: &TraceRecord) -> anyhow::Result<()>;
    async fn span(&self, record: &SpanRecord) -> anyhow::Result<()>;
    async fn generation(&self, record: &GenerationRecord) -> anyhow::Result<()>;
    async fn update(&self, update: &SpanUpdate) -> anyhow::Result<()>;
    async fn flush_async(&self) -> anyhow::Result<()>;
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 执行一次后端调用，吞掉错误与 panic
async fn isolate<F>(op: &'static str, fut: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(op, error = %e, "trace backend call failed, ignored"),
        Err(_) => tracing::warn!(op, "trace backend call panicked, ignored"),
    }
}

/// 容错 Sink：可克隆，显式通过 ExecutionContext 传递
#[derive(Clone, Default)]
pub struct ResilientSink {
    backend: Option<Arc<dyn TraceBackend>>,
}

impl ResilientSink {
    pub fn new(backend: Arc<dyn TraceBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// 不上报任何数据的 Sink
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// 开始一个 span；parent 为 None 时同时创建新 trace。总是返回可用的 SpanId
    pub async fn start_span(&self, name: &str, parent: Option<&SpanId>, input: Value) -> SpanId {
        let span = SpanId {
            trace_id: parent.map(|p| p.trace_id.clone()).unwrap_or_else(new_id),
            id: new_id(),
        };
        let Some(backend) = &self.backend else {
            return span;
        };

        if parent.is_none() {
            let trace = TraceRecord {
                id: span.trace_id.clone(),
                name: name.to_string(),
                input: input.clone(),
                timestamp: now(),
            };
            isolate("trace", backend.trace(&trace)).await;
        }

        let record = SpanRecord {
            id: span.id.clone(),
            trace_id: span.trace_id.clone(),
            parent_id: parent.map(|p| p.id.clone()),
            name: name.to_string(),
            input,
            status: SpanStatus::Running,
            start_time: now(),
        };
        isolate("span", backend.span(&record)).await;
        span
    }

    pub async fn end_span(&self, span: &SpanId, output: Value, status: SpanStatus) {
        let Some(backend) = &self.backend else {
            return;
        };
        let update = SpanUpdate {
            id: span.id.clone(),
            trace_id: span.trace_id.clone(),
            output,
            status,
            end_time: now(),
        };
        isolate("update", backend.update(&update)).await;
    }

    pub async fn generation(
        &self,
        name: &str,
        parent: Option<&SpanId>,
        input: Value,
        output: Option<Value>,
    ) {
        let Some(backend) = &self.backend else {
            return;
        };
        let record = GenerationRecord {
            id: new_id(),
            trace_id: parent.map(|p| p.trace_id.clone()).unwrap_or_else(new_id),
            parent_id: parent.map(|p| p.id.clone()),
            name: name.to_string(),
            input,
            output,
            timestamp: now(),
        };
        isolate("generation", backend.generation(&record)).await;
    }

    /// 将缓冲数据推送到后端；不受取消信号影响
    pub async fn flush(&self) {
        if let Some(backend) = &self.backend {
            isolate("flush", backend.flush_async()).await;
        }
    }

    /// 常驻进程用：每隔 every 推送一次，cancel 触发后退出
    pub fn spawn_periodic_flush(
        &self,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sink.flush().await,
                }
            }
        })
    }
}
