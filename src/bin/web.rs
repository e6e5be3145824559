//! Quill Web API
//!
//! 启动: cargo run --bin quill-web --features web
//! - POST /api/chat      入站 `{messages, userId?}`，以 NDJSON 流式返回 AgentChunk，最后一行为 finish
//! - POST /api/pipeline  入站 `{input}`，返回 OrchestrationResult；失败时 500 + `{stage, error}`
//! - GET  /api/health

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use quill::agent::Agent;
use quill::config::{load_config, AppConfig};
use quill::core::{
    assistant_agent, ContentAgents, ContentPipeline, ExecutionContext, OrchestrationResult,
    ShutdownCoordinator, ShutdownManager, TraceFlushCleanup,
};
use quill::llm::{FinishReason, Usage};
use quill::memory::{ConversationMemory, Message};
use quill::react::AgentChunk;

const DEFAULT_PORT: u16 = 8080;

struct AppState {
    config: AppConfig,
    assistant: Agent,
    pipeline: ContentPipeline,
    /// 请求上下文模板：共享 sink，每个请求派生自己的取消令牌
    ctx: ExecutionContext,
    shutdown: ShutdownManager,
}

impl AppState {
    fn request_context(&self) -> ExecutionContext {
        self.ctx
            .clone()
            .with_cancel(self.shutdown.token().child_token())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<Message>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipelineRequest {
    input: String,
}

/// 单行 NDJSON
fn ndjson<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(s) => format!("{s}\n"),
        Err(e) => format!("{}\n", json!({ "type": "error", "content": e.to_string() })),
    }
}

fn finish_line(finish_reason: FinishReason, usage: Usage) -> String {
    ndjson(&json!({
        "type": "finish",
        "content": { "finishReason": finish_reason, "usage": usage },
    }))
}

/// 一个事件对应的输出行；最后一个事件后追加 finish 行
fn chunk_lines(chunk: &AgentChunk) -> String {
    let mut out = ndjson(chunk);
    match chunk {
        AgentChunk::AgentComplete(summary) => {
            out.push_str(&finish_line(summary.finish_reason, summary.usage))
        }
        AgentChunk::Error(_) => out.push_str(&finish_line(FinishReason::Error, Usage::default())),
        _ => {}
    }
    out
}

/// POST /api/chat：最后一条 user 消息为本轮输入，之前的消息作为历史
async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    let memory = ConversationMemory::from_messages(req.messages, state.config.app.max_context_turns);
    let Some((history, last)) = memory.split_last_user() else {
        return Err((
            StatusCode::BAD_REQUEST,
            "last message must be a user message".to_string(),
        ));
    };
    if last.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is empty".to_string()));
    }
    tracing::info!(user_id = ?req.user_id, history = history.len(), "chat request");

    let stream = state
        .assistant
        .stream(history, last.content, state.request_context())
        .into_stream()
        .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk_lines(&chunk))));

    let mut res = Response::new(Body::from_stream(stream));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    Ok(res)
}

/// POST /api/pipeline
async fn api_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PipelineRequest>,
) -> Result<Json<OrchestrationResult>, (StatusCode, Json<serde_json::Value>)> {
    let input = req.input.trim();
    if input.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "input is required" })),
        ));
    }
    state
        .pipeline
        .run(input, &state.request_context())
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "stage": e.stage, "error": e.to_string() })),
            )
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quill::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    // 常驻进程：不在每次运行结束时 flush，改为定时推送，关闭时再推送一次
    let ctx = ExecutionContext::from_config(&cfg).with_flush_on_finish(false);
    let flusher = ctx.sink.spawn_periodic_flush(
        std::time::Duration::from_secs(cfg.tracing.flush_interval_secs.max(1)),
        shutdown.token(),
    );
    let mut coordinator = ShutdownCoordinator::new(shutdown.clone());
    coordinator.register(TraceFlushCleanup::new(ctx.sink.clone()));

    let state = Arc::new(AppState {
        assistant: assistant_agent(&cfg).context("Failed to build assistant")?,
        pipeline: ContentPipeline::new(
            ContentAgents::from_config(&cfg).context("Failed to build agents")?,
        ),
        config: cfg,
        ctx,
        shutdown: shutdown.clone(),
    });

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/pipeline", post(api_pipeline))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state);

    let port = std::env::var("QUILL_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Quill Web API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    let _ = flusher.await;
    coordinator.run_cleanup().await;
    Ok(())
}
