//! 单 Agent 运行器集成测试：记忆化工具、步数上限、结构化输出、流式事件、取消与 Trace 容错

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use quill::agent::Agent;
    use quill::core::{AgentError, ExecutionContext};
    use quill::llm::{FinishReason, LlmError, ModelRef, ScriptedModel, StepResponse, ToolCall};
    use quill::memory::Message;
    use quill::observability::testing::{FailingBackend, FailureMode, RecordingBackend};
    use quill::observability::{ResilientSink, SpanId};
    use quill::react::AgentChunk;
    use quill::tools::{AnswerTool, ToolCache, TypedTool};

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct CountArgs {
        key: String,
    }

    #[allow(dead_code)]
    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Verdict {
        label: String,
        score: f64,
        #[serde(default)]
        reason: Option<String>,
    }

    fn counting_tool(counter: Arc<AtomicUsize>) -> TypedTool<CountArgs> {
        TypedTool::new("count", "Counts executions", move |args: CountArgs| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "key": args.key }))
            }
        })
    }

    fn slow_tool() -> TypedTool<CountArgs> {
        TypedTool::new("count", "Never finishes in time", |_args: CountArgs| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        })
    }

    fn model(script: Vec<StepResponse>) -> ModelRef {
        ModelRef::new(Arc::new(ScriptedModel::new(script)))
    }

    fn count_call(id: &str, key: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "count".to_string(),
            arguments: json!({ "key": key }),
        }
    }

    fn agent_with_counter(script: Vec<StepResponse>, counter: &Arc<AtomicUsize>) -> Agent {
        Agent::builder("counter", model(script))
            .system_prompt("count things")
            .tool(counting_tool(Arc::clone(counter)))
            .build()
            .unwrap()
    }

    fn chunk_type(chunk: &AgentChunk) -> &'static str {
        match chunk {
            AgentChunk::Text(_) => "text",
            AgentChunk::ToolStart(_) => "tool-start",
            AgentChunk::ToolEnd(_) => "tool-end",
            AgentChunk::StepComplete(_) => "step-complete",
            AgentChunk::AgentComplete(_) => "agent-complete",
            AgentChunk::Error(_) => "error",
        }
    }

    #[tokio::test]
    async fn test_identical_calls_execute_once_per_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(RecordingBackend::default());
        let ctx = ExecutionContext::new()
            .with_sink(ResilientSink::new(backend.clone()))
            .with_cache(ToolCache::new());

        let script = || {
            vec![
                StepResponse::tool_call("c1", "count", json!({ "key": "a" })),
                StepResponse::text("done"),
            ]
        };
        let first = agent_with_counter(script(), &counter)
            .run(&[], "count a", &ctx)
            .await
            .unwrap();
        let second = agent_with_counter(script(), &counter)
            .run(&[], "count a again", &ctx)
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first.first_tool_result(), second.first_tool_result());
        assert_eq!(backend.spans_named("tool:count").len(), 1);
        // 两次运行都拥有自己的 trace，各 flush 一次
        assert_eq!(backend.flushes(), 2);
    }

    #[tokio::test]
    async fn test_parallel_identical_calls_in_one_step() {
        let counter = Arc::new(AtomicUsize::new(0));
        let both = StepResponse {
            tool_calls: vec![count_call("c1", "a"), count_call("c2", "a")],
            finish_reason: FinishReason::ToolCalls,
            ..Default::default()
        };
        let run = agent_with_counter(vec![both, StepResponse::text("done")], &counter)
            .run(&[], "count twice", &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(run.tool_results().len(), 2);
        assert_eq!(run.tool_results()[0].result, run.tool_results()[1].result);
    }

    #[tokio::test]
    async fn test_different_args_are_distinct_entries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let both = StepResponse {
            tool_calls: vec![count_call("c1", "a"), count_call("c2", "b")],
            finish_reason: FinishReason::ToolCalls,
            ..Default::default()
        };
        let cache = ToolCache::new();
        agent_with_counter(vec![both, StepResponse::text("done")], &counter)
            .run(&[], "count", &ExecutionContext::new().with_cache(cache.clone()))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_step_budget_bounds_model_calls() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scripted = ScriptedModel::from_fn(|_, i| {
            Ok(StepResponse::tool_call(
                format!("c{i}"),
                "count",
                json!({ "key": format!("k{i}") }),
            ))
        });
        let recorder = scripted.recorder();
        let agent = Agent::builder("looper", ModelRef::new(Arc::new(scripted)))
            .tool(counting_tool(Arc::clone(&counter)))
            .max_steps(2)
            .build()
            .unwrap();

        let run = agent
            .run(&[], "keep counting", &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(recorder.lock().unwrap().len(), 2);
        assert_eq!(run.steps, 2);
        assert_eq!(run.finish_reason, FinishReason::ToolCalls);
        assert_eq!(run.tool_calls.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_structured_output_is_terminal_call_args() {
        let agent = Agent::builder(
            "classifier",
            model(vec![
                StepResponse::tool_call("c1", "verdict", json!({ "label": "spam", "score": 0.9 })),
                StepResponse::text("should never be requested"),
            ]),
        )
        .tool(AnswerTool::<Verdict>::new("verdict", "Final verdict"))
        .structured_output(true)
        .build()
        .unwrap();

        let run = agent
            .run(&[], "classify this", &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(run.steps, 1);
        assert_eq!(
            run.structured_output(),
            Some(&json!({ "label": "spam", "score": 0.9 }))
        );
    }

    #[tokio::test]
    async fn test_structured_output_keeps_exact_arguments() {
        let agent = Agent::builder(
            "classifier",
            model(vec![StepResponse::tool_call(
                "c1",
                "verdict",
                json!({ "label": "ham", "score": 0.1, "note": "extra" }),
            )]),
        )
        .tool(AnswerTool::<Verdict>::new("verdict", "Final verdict"))
        .structured_output(true)
        .build()
        .unwrap();

        let run = agent
            .run(&[], "classify this", &ExecutionContext::new())
            .await
            .unwrap();
        // 省略的可选字段不补 null，多余字段不丢弃
        assert_eq!(
            run.structured_output(),
            Some(&json!({ "label": "ham", "score": 0.1, "note": "extra" }))
        );
    }

    #[tokio::test]
    async fn test_structured_output_without_terminal_uses_last_call() {
        let counter = Arc::new(AtomicUsize::new(0));
        let agent = Agent::builder(
            "picker",
            model(vec![
                StepResponse::tool_call("c1", "count", json!({ "key": "a" })),
                StepResponse::tool_call("c2", "count", json!({ "key": "b" })),
                StepResponse::text("done"),
            ]),
        )
        .tool(counting_tool(Arc::clone(&counter)))
        .structured_output(true)
        .build()
        .unwrap();

        let run = agent
            .run(&[], "pick", &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(run.steps, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(run.structured_output(), Some(&json!({ "key": "b" })));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_fed_back_and_recovered() {
        let counter = Arc::new(AtomicUsize::new(0));
        let run = agent_with_counter(
            vec![
                StepResponse::tool_call("c1", "count", json!({ "kee": "a" })),
                StepResponse::tool_call("c2", "count", json!({ "key": "a" })),
                StepResponse::text("done"),
            ],
            &counter,
        )
        .run(&[], "count a", &ExecutionContext::new())
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(run.tool_results()[0].is_error);
        assert!(!run.tool_results()[1].is_error);
        assert_eq!(run.first_tool_result(), Some(&json!({ "key": "a" })));
        assert_eq!(run.text(), Some("done"));
    }

    #[tokio::test]
    async fn test_stream_emits_chunks_in_step_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let agent = agent_with_counter(
            vec![
                StepResponse {
                    text: Some("Let me count.".into()),
                    ..StepResponse::tool_call("c1", "count", json!({ "key": "a" }))
                }
                .with_usage(10, 4),
                StepResponse::text("There is one.").with_usage(20, 5),
            ],
            &counter,
        );

        let mut stream = agent.stream(
            vec![Message::user("hi"), Message::assistant("hello")],
            "count a",
            ExecutionContext::new(),
        );
        let mut types = Vec::new();
        let mut last = None;
        while let Some(chunk) = stream.next().await {
            types.push(chunk_type(&chunk));
            last = Some(chunk);
        }
        assert_eq!(
            types,
            vec![
                "text",
                "tool-start",
                "tool-end",
                "step-complete",
                "text",
                "step-complete",
                "agent-complete"
            ]
        );
        match last {
            Some(AgentChunk::AgentComplete(summary)) => {
                assert_eq!(summary.steps, 2);
                assert_eq!(summary.usage.total(), 39);
                assert_eq!(summary.finish_reason, FinishReason::Stop);
            }
            other => panic!("unexpected last chunk: {other:?}"),
        }

        let run = stream.finish().await.unwrap();
        assert_eq!(run.text(), Some("There is one."));
    }

    #[tokio::test]
    async fn test_stream_run_writes_text() {
        let agent = Agent::builder("writer", model(vec![StepResponse::text("Hello world")]))
            .build()
            .unwrap();
        let mut out = Vec::new();
        let run = agent
            .stream(Vec::new(), "greet", ExecutionContext::new())
            .run(&mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hello world");
        assert_eq!(run.steps, 1);
    }

    #[tokio::test]
    async fn test_stream_ends_with_error_on_model_failure() {
        let agent = Agent::builder(
            "broken",
            ModelRef::new(Arc::new(
                ScriptedModel::new(vec![]).then_fail(LlmError::Request("down".into())),
            )),
        )
        .build()
        .unwrap();

        let mut stream = agent.stream(Vec::new(), "hi", ExecutionContext::new());
        let chunk = stream.next().await.unwrap();
        assert!(matches!(chunk, AgentChunk::Error(ref m) if m.contains("down")));
        assert!(stream.next().await.is_none());
        assert!(matches!(stream.finish().await, Err(AgentError::Llm(_))));
    }

    #[tokio::test]
    async fn test_cancellation_is_distinct_from_model_error() {
        let agent = Agent::builder(
            "slow",
            model(vec![StepResponse::tool_call("c1", "count", json!({ "key": "a" }))]),
        )
        .tool(slow_tool())
        .build()
        .unwrap();

        let cache = ToolCache::new();
        let ctx = ExecutionContext::new().with_cache(cache.clone());
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = agent.run(&[], "count", &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failing_trace_backend_does_not_change_result() {
        let script = || {
            vec![
                StepResponse::tool_call("c1", "count", json!({ "key": "a" })).with_usage(5, 5),
                StepResponse::text("done").with_usage(7, 2),
            ]
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let baseline = agent_with_counter(script(), &counter)
            .run(&[], "count", &ExecutionContext::new())
            .await
            .unwrap();

        for mode in [FailureMode::Error, FailureMode::Panic] {
            let ctx = ExecutionContext::new()
                .with_sink(ResilientSink::new(Arc::new(FailingBackend::new(mode))));
            let run = agent_with_counter(script(), &counter)
                .run(&[], "count", &ctx)
                .await
                .unwrap();
            assert_eq!(run, baseline, "mode {mode:?}");
        }
    }

    #[tokio::test]
    async fn test_child_run_does_not_flush() {
        let backend = Arc::new(RecordingBackend::default());
        let mut ctx = ExecutionContext::new().with_sink(ResilientSink::new(backend.clone()));
        ctx.parent = Some(SpanId {
            trace_id: "trace-1".into(),
            id: "span-1".into(),
        });

        let agent = Agent::builder("child", model(vec![StepResponse::text("ok")]))
            .build()
            .unwrap();
        agent.run(&[], "hi", &ctx).await.unwrap();

        assert_eq!(backend.flushes(), 0);
        assert!(backend.traces().is_empty());
        let span = backend.spans_named("child").remove(0);
        assert_eq!(span.parent_id.as_deref(), Some("span-1"));
        assert_eq!(backend.generations().len(), 1);
    }
}
