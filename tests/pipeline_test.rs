//! 内容流水线集成测试：每个阶段使用脚本化模型

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use quill::core::{
        Action, ContentAgents, ContentPipeline, ExecutionContext, OrchestrationResult, Platform,
        Stage,
    };
    use quill::llm::mock::last_user_content;
    use quill::llm::{LlmError, ModelRef, ScriptedModel, StepRequest, StepResponse};
    use quill::observability::testing::{FailingBackend, FailureMode, RecordingBackend};
    use quill::observability::{ResilientSink, SpanStatus};
    use quill::tools::ToolCache;

    const REQUEST: &str = "Write a LinkedIn post about AI trends";

    struct Harness {
        pipeline: ContentPipeline,
        requests: HashMap<&'static str, Arc<Mutex<Vec<StepRequest>>>>,
    }

    impl Harness {
        fn new(
            router: ScriptedModel,
            research: ScriptedModel,
            strategy: ScriptedModel,
            formatter: ScriptedModel,
            publisher: ScriptedModel,
        ) -> Self {
            let mut requests = HashMap::new();
            let mut models: HashMap<&'static str, ModelRef> = HashMap::new();
            for (name, model) in [
                ("router", router),
                ("research", research),
                ("strategy", strategy),
                ("formatter", formatter),
                ("publisher", publisher),
            ] {
                requests.insert(name, model.recorder());
                models.insert(name, ModelRef::new(Arc::new(model)));
            }
            let agents = ContentAgents::with_model_fn(|name| models[name].clone()).unwrap();
            Self {
                pipeline: ContentPipeline::new(agents),
                requests,
            }
        }

        fn requests(&self, stage: &str) -> Vec<StepRequest> {
            self.requests[stage].lock().unwrap().clone()
        }

        /// 某阶段第一次模型调用收到的用户输入
        fn first_prompt(&self, stage: &str) -> String {
            let requests = self.requests(stage);
            last_user_content(&requests[0]).unwrap().to_string()
        }
    }

    fn route(action: &str, platform: &str) -> ScriptedModel {
        ScriptedModel::new(vec![StepResponse::tool_call(
            "call_route",
            "route_request",
            json!({ "action": action, "platform": platform }),
        )])
    }

    fn tool_then_done(name: &str, args: Value) -> ScriptedModel {
        ScriptedModel::new(vec![
            StepResponse::tool_call("call_1", name, args).with_usage(30, 10),
            StepResponse::text("done").with_usage(40, 5),
        ])
    }

    /// 把 JSON 形式的输入原样作为工具参数
    fn relay(name: &'static str) -> ScriptedModel {
        ScriptedModel::from_fn(move |req, i| {
            if i > 0 {
                return Ok(StepResponse::text("done"));
            }
            let args = last_user_content(req)
                .and_then(|c| serde_json::from_str::<Value>(c).ok())
                .unwrap_or(Value::Null);
            Ok(StepResponse::tool_call("call_1", name, args))
        })
    }

    fn strategy_model(tone: Option<&str>) -> ScriptedModel {
        let mut args = json!({
            "topic": "AI trends",
            "platform": "linkedin",
            "content": "AI is reshaping work",
        });
        if let Some(tone) = tone {
            args["tone"] = json!(tone);
        }
        tool_then_done("create_strategy", args)
    }

    fn standard(tone: Option<&str>) -> Harness {
        Harness::new(
            route("create_content", "linkedin"),
            tool_then_done("research_topic", json!({ "topic": "AI trends" })),
            strategy_model(tone),
            relay("format_content"),
            relay("publish_content"),
        )
    }

    fn recording_ctx() -> (ExecutionContext, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let ctx = ExecutionContext::new().with_sink(ResilientSink::new(backend.clone()));
        (ctx, backend)
    }

    /// 去掉发布结果中随时间变化的字段
    fn stable(result: OrchestrationResult) -> Value {
        let mut v = serde_json::to_value(result).unwrap();
        if let Some(p) = v.get_mut("publishedContent").and_then(Value::as_object_mut) {
            p.remove("id");
            p.remove("publishedAt");
        }
        v
    }

    #[tokio::test]
    async fn test_create_content_end_to_end() {
        let h = standard(None);
        let (ctx, backend) = recording_ctx();

        let result = h.pipeline.run(REQUEST, &ctx).await.unwrap();

        assert_eq!(result.action, Action::CreateContent);
        assert_eq!(result.platform, Platform::Linkedin);
        assert_eq!(result.references.as_ref().unwrap().as_array().unwrap().len(), 2);
        assert_eq!(result.strategy.as_ref().unwrap()["platform"], "linkedin");

        let formatted = result.formatted_content.clone().unwrap();
        assert_eq!(
            formatted["formattedContent"],
            "[LINKEDIN] AI is reshaping work (in professional tone)"
        );
        let published = result.published_content.clone().unwrap();
        assert_eq!(published["status"], "published");
        assert_eq!(published["content"], formatted["formattedContent"]);
        assert_eq!(published["metadata"], formatted["metadata"]);
        assert!(result.message.is_none());

        assert_eq!(h.first_prompt("research"), format!("Research this topic: {REQUEST}"));
        let strategy_prompt = h.first_prompt("strategy");
        assert!(strategy_prompt.contains("linkedin"));
        assert!(strategy_prompt.contains("Research findings:"));
        assert!(strategy_prompt.contains("references"));

        // 一个 trace，各阶段 span 挂在流水线根 span 下，且只 flush 一次
        assert_eq!(backend.traces().len(), 1);
        let root = backend.spans_named("content-pipeline").remove(0);
        assert!(root.parent_id.is_none());
        for stage in ["router", "research", "strategy", "formatter", "publisher"] {
            let spans = backend.spans_named(stage);
            assert_eq!(spans.len(), 1, "stage {stage}");
            assert_eq!(spans[0].parent_id.as_deref(), Some(root.id.as_str()));
            assert_eq!(spans[0].trace_id, root.trace_id);
        }
        assert_eq!(backend.flushes(), 1);
    }

    #[tokio::test]
    async fn test_missing_routing_decision_defaults_to_blog_content() {
        let h = Harness::new(
            ScriptedModel::new(vec![StepResponse::text("I am not sure")]),
            tool_then_done("research_topic", json!({ "topic": "AI trends" })),
            strategy_model(None),
            relay("format_content"),
            relay("publish_content"),
        );
        let result = h.pipeline.run(REQUEST, &ExecutionContext::new()).await.unwrap();

        assert_eq!(result.action, Action::CreateContent);
        assert_eq!(result.platform, Platform::Blog);
        assert_eq!(h.requests("research").len(), 2);
        let format_args: Value = serde_json::from_str(&h.first_prompt("formatter")).unwrap();
        assert_eq!(format_args["platform"], "blog");
    }

    #[tokio::test]
    async fn test_unknown_platform_keeps_action() {
        let h = Harness::new(
            route("create_strategy", "myspace"),
            tool_then_done("research_topic", json!({ "topic": "x" })),
            strategy_model(None),
            relay("format_content"),
            relay("publish_content"),
        );
        let result = h.pipeline.run(REQUEST, &ExecutionContext::new()).await.unwrap();
        assert_eq!(result.action, Action::CreateStrategy);
        assert_eq!(result.platform, Platform::Blog);
    }

    #[tokio::test]
    async fn test_tone_defaults_to_professional() {
        let h = standard(None);
        h.pipeline.run(REQUEST, &ExecutionContext::new()).await.unwrap();

        let args: Value = serde_json::from_str(&h.first_prompt("formatter")).unwrap();
        assert_eq!(
            args,
            json!({
                "content": "AI is reshaping work",
                "platform": "linkedin",
                "tone": "professional"
            })
        );
    }

    #[tokio::test]
    async fn test_strategy_tone_reaches_formatter() {
        let h = standard(Some("witty"));
        let result = h.pipeline.run(REQUEST, &ExecutionContext::new()).await.unwrap();

        let args: Value = serde_json::from_str(&h.first_prompt("formatter")).unwrap();
        assert_eq!(args["tone"], "witty");
        assert!(result.formatted_content.unwrap()["formattedContent"]
            .as_str()
            .unwrap()
            .ends_with("(in witty tone)"));
    }

    #[tokio::test]
    async fn test_create_strategy_runs_strategy_only() {
        let h = Harness::new(
            route("create_strategy", "twitter"),
            tool_then_done("research_topic", json!({ "topic": "x" })),
            strategy_model(Some("casual")),
            relay("format_content"),
            relay("publish_content"),
        );
        let result = h.pipeline.run(REQUEST, &ExecutionContext::new()).await.unwrap();

        assert_eq!(result.action, Action::CreateStrategy);
        assert_eq!(result.platform, Platform::Twitter);
        assert_eq!(result.strategy.unwrap()["tone"], "casual");
        assert!(result.references.is_none());
        assert!(result.formatted_content.is_none());
        assert!(result.published_content.is_none());
        assert!(h.requests("research").is_empty());
        assert!(h.requests("formatter").is_empty());
        assert!(h
            .first_prompt("strategy")
            .starts_with("Create a content strategy for twitter about:"));
    }

    #[tokio::test]
    async fn test_manage_content_is_not_implemented() {
        let h = Harness::new(
            route("manage_content", "blog"),
            tool_then_done("research_topic", json!({ "topic": "x" })),
            strategy_model(None),
            relay("format_content"),
            relay("publish_content"),
        );
        let result = h.pipeline.run("Update post 42", &ExecutionContext::new()).await.unwrap();

        assert_eq!(result.action, Action::ManageContent);
        assert_eq!(result.message.as_deref(), Some("workflow not implemented"));
        assert!(h.requests("strategy").is_empty());
    }

    #[tokio::test]
    async fn test_stage_error_names_stage_and_still_flushes() {
        let h = Harness::new(
            route("create_content", "linkedin"),
            tool_then_done("research_topic", json!({ "topic": "AI trends" })),
            strategy_model(None),
            ScriptedModel::new(vec![]).then_fail(LlmError::Request("rate limited".into())),
            relay("publish_content"),
        );
        let (ctx, backend) = recording_ctx();

        let err = h.pipeline.run(REQUEST, &ctx).await.unwrap_err();
        assert_eq!(err.stage, Stage::Formatter);
        assert!(err.to_string().starts_with("formatter stage failed:"));
        assert!(err.to_string().contains("rate limited"));
        assert!(h.requests("publisher").is_empty());

        let root = backend.spans_named("content-pipeline").remove(0);
        let root_update = backend
            .updates()
            .into_iter()
            .find(|u| u.id == root.id)
            .unwrap();
        assert_eq!(root_update.status, SpanStatus::Error);
        assert_eq!(backend.flushes(), 1);
    }

    #[tokio::test]
    async fn test_failing_trace_backend_does_not_change_result() {
        let baseline = stable(
            standard(None)
                .pipeline
                .run(REQUEST, &ExecutionContext::new())
                .await
                .unwrap(),
        );

        for mode in [FailureMode::Error, FailureMode::Panic] {
            let ctx = ExecutionContext::new()
                .with_sink(ResilientSink::new(Arc::new(FailingBackend::new(mode))));
            let result = standard(None).pipeline.run(REQUEST, &ctx).await.unwrap();
            assert_eq!(stable(result), baseline, "mode {mode:?}");
        }
    }

    #[tokio::test]
    async fn test_stages_share_one_tool_cache() {
        let h = standard(None);
        let cache = ToolCache::new();
        let ctx = ExecutionContext::new().with_cache(cache.clone());
        h.pipeline.run(REQUEST, &ctx).await.unwrap();

        // research / strategy / format 已缓存，publish 不缓存
        assert_eq!(cache.len(), 3);
        assert!(cache
            .get("research_topic", &json!({ "topic": "AI trends", "depth": null }))
            .is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = standard(None);
        let (ctx, backend) = recording_ctx();
        ctx.cancel.cancel();

        let err = h.pipeline.run(REQUEST, &ctx).await.unwrap_err();
        assert_eq!(err.stage, Stage::Router);
        assert!(err.is_cancelled());
        assert!(h.requests("router").is_empty());
        assert_eq!(backend.flushes(), 1);
    }
}
