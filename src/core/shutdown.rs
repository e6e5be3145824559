//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 转为取消信号：正在运行的 Agent 收到 Cancelled 后尽快退出，
//! 随后 ShutdownCoordinator 依次执行清理任务（如把缓冲的 trace 推送出去），每个任务有超时上限。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::observability::ResilientSink;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

/// 关闭信号管理器：持有根取消令牌
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根令牌的克隆，传入 ExecutionContext
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if let Ok(mut current) = self.reason.lock() {
            current.get_or_insert(reason);
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, cancelling running agents...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, cancelling running agents...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时执行的清理任务
#[async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：按注册顺序执行清理任务
pub struct ShutdownCoordinator {
    manager: ShutdownManager,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(manager: ShutdownManager) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout_secs: 5,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub fn manager(&self) -> &ShutdownManager {
        &self.manager
    }

    /// 执行所有清理任务；失败或超时只记日志
    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());
        let timeout = Duration::from_secs(self.timeout_secs);

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!("Cleanup task '{}' completed", name),
                Ok(Err(e)) => tracing::warn!("Cleanup task '{}' failed: {}", name, e),
                Err(_) => tracing::warn!(
                    "Cleanup task '{}' timed out after {}s",
                    name,
                    self.timeout_secs
                ),
            }
        }
    }

    /// 运行 app 直到完成或收到关闭信号，然后执行清理。被取消时返回 None
    pub async fn run<F, T>(&self, app: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let output = tokio::select! {
            out = app => Some(out),
            _ = self.manager.wait_for_shutdown() => {
                tracing::info!(reason = ?self.manager.reason(), "shutdown requested");
                None
            }
        };
        self.run_cleanup().await;
        output
    }
}

/// 退出前推送缓冲的 trace 数据
pub struct TraceFlushCleanup {
    sink: ResilientSink,
}

impl TraceFlushCleanup {
    pub fn new(sink: ResilientSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ShutdownCleanup for TraceFlushCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        // flush 自身不会失败，后端错误已在 sink 内吸收
        self.sink.flush().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TraceFlush"
    }
}
