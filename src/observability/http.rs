//! HTTP Trace 后端（Langfuse 兼容 ingestion API）
//!
//! 所有事件先写入内存缓冲，flush_async 时以一个 batch POST 到 `{endpoint}/api/public/ingestion`。
//! 缓冲达到 max_buffered 条时立即 flush，缓冲因此有上界。
//! 推送失败时该批事件丢弃，错误交给 ResilientSink 记录。

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::TracingSection;
use crate::observability::{GenerationRecord, SpanRecord, SpanUpdate, TraceBackend, TraceRecord};

const INGESTION_PATH: &str = "/api/public/ingestion";
const DEFAULT_MAX_BUFFERED: usize = 1000;

pub struct HttpTraceBackend {
    client: reqwest::Client,
    url: String,
    public_key: String,
    secret_key: String,
    buffer: Mutex<Vec<Value>>,
    max_buffered: usize,
}

impl HttpTraceBackend {
    pub fn new(endpoint: &str, public_key: &str, secret_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build trace http client")?;
        Ok(Self {
            client,
            url: format!("{}{}", endpoint.trim_end_matches('/'), INGESTION_PATH),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
            buffer: Mutex::new(Vec::new()),
            max_buffered: DEFAULT_MAX_BUFFERED,
        })
    }

    pub fn with_max_buffered(mut self, n: usize) -> Self {
        self.max_buffered = n.max(1);
        self
    }

    /// 按 [tracing] 配置创建；未启用或缺少密钥时返回 None
    pub fn from_config(cfg: &TracingSection) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let (Some(public_key), Some(secret_key)) = (&cfg.public_key, &cfg.secret_key) else {
            tracing::warn!("tracing enabled but public_key/secret_key missing, trace disabled");
            return None;
        };
        match Self::new(&cfg.endpoint, public_key, secret_key) {
            Ok(backend) => Some(backend.with_max_buffered(cfg.max_buffered_events)),
            Err(e) => {
                tracing::warn!("trace backend init failed: {e:#}");
                None
            }
        }
    }

    /// 写入缓冲；达到上限时立即推送
    async fn enqueue(&self, kind: &str, body: &impl Serialize) -> anyhow::Result<()> {
        let event = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "type": kind,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "body": serde_json::to_value(body)?,
        });
        let pending = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|e| anyhow::anyhow!("trace buffer poisoned: {e}"))?;
            buffer.push(event);
            buffer.len()
        };
        if pending >= self.max_buffered {
            return self.flush_async().await;
        }
        Ok(())
    }

    /// 当前缓冲的事件数
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TraceBackend for HttpTraceBackend {
    async fn trace(&self, record: &TraceRecord) -> anyhow::Result<()> {
        self.enqueue("trace-create", record).await
    }

    async fn span(&self, record: &SpanRecord) -> anyhow::Result<()> {
        self.enqueue("span-create", record).await
    }

    async fn generation(&self, record: &GenerationRecord) -> anyhow::Result<()> {
        self.enqueue("generation-create", record).await
    }

    async fn update(&self, update: &SpanUpdate) -> anyhow::Result<()> {
        self.enqueue("span-update", update).await
    }

    async fn flush_async(&self) -> anyhow::Result<()> {
        let batch = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|e| anyhow::anyhow!("trace buffer poisoned: {e}"))?;
            std::mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        self.client
            .post(&self.url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await
            .context("send trace batch")?
            .error_for_status()
            .context("trace ingestion rejected batch")?;
        tracing::debug!(count, "trace batch flushed");
        Ok(())
    }
}
