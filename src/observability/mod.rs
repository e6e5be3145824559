//! 可观测性：本地日志初始化 + 外部 Trace 上报（容错 Sink）

pub mod http;
pub mod sink;
pub mod testing;

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::TracingSection;

pub use http::HttpTraceBackend;
pub use sink::{
    GenerationRecord, ResilientSink, SpanId, SpanRecord, SpanStatus, SpanUpdate, TraceBackend,
    TraceRecord,
};

/// 日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// 按配置创建 Sink；未启用时返回不上报的 Sink
pub fn sink_from_config(cfg: &TracingSection) -> ResilientSink {
    match HttpTraceBackend::from_config(cfg) {
        Some(backend) => {
            tracing::info!(endpoint = %cfg.endpoint, "trace backend enabled");
            ResilientSink::new(Arc::new(backend))
        }
        None => ResilientSink::disabled(),
    }
}
