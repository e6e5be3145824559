//! 运行上下文：显式传递 Trace Sink、父 span、工具缓存与取消令牌
//!
//! 顶层调用（CLI / HTTP）构建一个 ExecutionContext；编排器为每个阶段派生子上下文，
//! 各阶段因此共享同一个 trace 和同一个工具缓存。

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::observability::{sink_from_config, ResilientSink, SpanId};
use crate::tools::ToolCache;

/// 默认工具超时（秒）
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct ExecutionContext {
    pub sink: ResilientSink,
    /// 父 span；为 None 时本次运行自行创建 trace 并负责 flush
    pub parent: Option<SpanId>,
    /// 共享工具缓存；为 None 时每次运行新建
    pub cache: Option<ToolCache>,
    pub cancel: CancellationToken,
    /// 拥有 trace 的运行结束时是否 flush
    pub flush_on_finish: bool,
    pub tool_timeout_secs: u64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            sink: ResilientSink::disabled(),
            parent: None,
            cache: None,
            cancel: CancellationToken::new(),
            flush_on_finish: true,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建：Trace 后端、flush 策略、工具超时
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            sink: sink_from_config(&cfg.tracing),
            flush_on_finish: cfg.tracing.flush_on_finish,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            ..Self::default()
        }
    }

    pub fn with_sink(mut self, sink: ResilientSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_cache(mut self, cache: ToolCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_flush_on_finish(mut self, flush: bool) -> Self {
        self.flush_on_finish = flush;
        self
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// 本次运行是否拥有 trace（无父 span）
    pub fn owns_trace(&self) -> bool {
        self.parent.is_none()
    }

    /// 派生子上下文：挂在 parent 下，使用给定缓存
    pub fn child(&self, parent: SpanId, cache: ToolCache) -> Self {
        Self {
            sink: self.sink.clone(),
            parent: Some(parent),
            cache: Some(cache),
            cancel: self.cancel.clone(),
            flush_on_finish: self.flush_on_finish,
            tool_timeout_secs: self.tool_timeout_secs,
        }
    }

    /// 拥有 trace 且开启 flush_on_finish 时推送缓冲数据
    pub async fn flush_if_owner(&self) {
        if self.owns_trace() && self.flush_on_finish {
            self.sink.flush().await;
        }
    }
}
