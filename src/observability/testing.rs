//! Trace 后端测试替身：记录所有调用 / 每次调用都失败

use std::sync::Mutex;

use async_trait::async_trait;

use crate::observability::{GenerationRecord, SpanRecord, SpanUpdate, TraceBackend, TraceRecord};

/// 记录所有调用的后端
#[derive(Default)]
pub struct RecordingBackend {
    traces: Mutex<Vec<TraceRecord>>,
    spans: Mutex<Vec<SpanRecord>>,
    generations: Mutex<Vec<GenerationRecord>>,
    updates: Mutex<Vec<SpanUpdate>>,
    flushes: Mutex<usize>,
}

fn snapshot<T: Clone>(m: &Mutex<Vec<T>>) -> Vec<T> {
    m.lock().map(|v| v.clone()).unwrap_or_default()
}

impl RecordingBackend {
    pub fn traces(&self) -> Vec<TraceRecord> {
        snapshot(&self.traces)
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        snapshot(&self.spans)
    }

    /// 按名称筛选 span
    pub fn spans_named(&self, name: &str) -> Vec<SpanRecord> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    pub fn generations(&self) -> Vec<GenerationRecord> {
        snapshot(&self.generations)
    }

    pub fn updates(&self) -> Vec<SpanUpdate> {
        snapshot(&self.updates)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl TraceBackend for RecordingBackend {
    async fn trace(&self, record: &TraceRecord) -> anyhow::Result<()> {
        self.traces.lock().map_err(|e| anyhow::anyhow!("{e}"))?.push(record.clone());
        Ok(())
    }

    async fn span(&self, record: &SpanRecord) -> anyhow::Result<()> {
        self.spans.lock().map_err(|e| anyhow::anyhow!("{e}"))?.push(record.clone());
        Ok(())
    }

    async fn generation(&self, record: &GenerationRecord) -> anyhow::Result<()> {
        self.generations
            .lock()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .push(record.clone());
        Ok(())
    }

    async fn update(&self, update: &SpanUpdate) -> anyhow::Result<()> {
        self.updates.lock().map_err(|e| anyhow::anyhow!("{e}"))?.push(update.clone());
        Ok(())
    }

    async fn flush_async(&self) -> anyhow::Result<()> {
        *self.flushes.lock().map_err(|e| anyhow::anyhow!("{e}"))? += 1;
        Ok(())
    }
}

/// 失败方式
#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    Error,
    Panic,
}

/// 每个方法都失败的后端
pub struct FailingBackend {
    mode: FailureMode,
}

impl FailingBackend {
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }

    fn fail(&self, op: &str) -> anyhow::Result<()> {
        match self.mode {
            FailureMode::Error => Err(anyhow::anyhow!("trace backend unavailable ({op})")),
            FailureMode::Panic => panic!("trace backend exploded ({op})"),
        }
    }
}

#[async_trait]
impl TraceBackend for FailingBackend {
    async fn trace(&self, _record: &TraceRecord) -> anyhow::Result<()> {
        self.fail("trace")
    }

    async fn span(&self, _record: &SpanRecord) -> anyhow::Result<()> {
        self.fail("span")
    }

    async fn generation(&self, _record: &GenerationRecord) -> anyhow::Result<()> {
        self.fail("generation")
    }

    async fn update(&self, _update: &SpanUpdate) -> anyhow::Result<()> {
        self.fail("update")
    }

    async fn flush_async(&self) -> anyhow::Result<()> {
        self.fail("flush")
    }
}
