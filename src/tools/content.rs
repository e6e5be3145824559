//! 内容创作工具（占位实现）
//!
//! research_topic / create_strategy / format_content / publish_content 仅演示调用契约，
//! 不做真实检索或发布；route_request 是 router 阶段的终止型工具。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::routing::{Platform, RoutingDecision};
use crate::tools::{normalize_args, parse_args, schema_of, AnswerTool, Tool};

/// Twitter 单条字数上限
const TWITTER_MAX_CHARS: usize = 280;

/// router 的终止型工具：参数即 RoutingDecision
pub fn route_request_tool() -> AnswerTool<RoutingDecision> {
    AnswerTool::new(
        "route_request",
        "Classify the user's request into a workflow (create_strategy, create_content or manage_content) and a target platform.",
    )
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Brief,
    Detailed,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResearchArgs {
    /// 调研主题
    pub topic: String,
    /// 调研深度，默认 brief
    #[serde(default)]
    pub depth: Option<ResearchDepth>,
}

/// 调研工具：返回主题相关的参考资料
pub struct ResearchTool;

#[async_trait]
impl Tool for ResearchTool {
    fn name(&self) -> &str {
        "research_topic"
    }

    fn description(&self) -> &str {
        "Gather reference material for a topic. Returns a list of references with title, url and summary."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ResearchArgs>()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<ResearchArgs>(args)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: ResearchArgs = parse_args(&args)?;
        let topic = args.topic.trim();
        if topic.is_empty() {
            return Err("topic must not be empty".to_string());
        }
        let slug = topic.replace(char::is_whitespace, "_");
        let mut references = vec![
            json!({
                "title": format!("Overview of {topic}"),
                "url": format!("https://en.wikipedia.org/wiki/{slug}"),
                "summary": format!("Background and key concepts of {topic}."),
            }),
            json!({
                "title": format!("Recent developments in {topic}"),
                "url": format!("https://news.google.com/search?q={slug}"),
                "summary": format!("Latest news coverage about {topic}."),
            }),
        ];
        if matches!(args.depth, Some(ResearchDepth::Detailed)) {
            references.push(json!({
                "title": format!("{topic}: research papers"),
                "url": format!("https://arxiv.org/a/{slug}"),
                "summary": format!("Academic work related to {topic}."),
            }));
        }
        Ok(json!({ "topic": topic, "references": references }))
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StrategyArgs {
    /// 内容主题
    pub topic: String,
    /// 目标平台
    pub platform: Platform,
    /// 目标受众
    #[serde(default)]
    pub audience: Option<String>,
    /// 语气（如 professional、casual、witty）
    #[serde(default)]
    pub tone: Option<String>,
    /// 核心信息
    #[serde(default)]
    pub key_messages: Option<Vec<String>>,
    /// 策略对应的正文草稿
    #[serde(default)]
    pub content: Option<String>,
}

/// 策略工具：根据主题与平台给出受众、语气、核心信息与发布节奏
pub struct StrategyTool;

#[async_trait]
impl Tool for StrategyTool {
    fn name(&self) -> &str {
        "create_strategy"
    }

    fn description(&self) -> &str {
        "Create a content strategy for a topic on a platform: audience, tone, key messages, draft content and posting schedule."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<StrategyArgs>()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<StrategyArgs>(args)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: StrategyArgs = parse_args(&args)?;
        let schedule = match args.platform {
            Platform::Linkedin => "Tuesday-Thursday, 08:00-10:00",
            Platform::Twitter => "Daily, 12:00-13:00 and 17:00-18:00",
            Platform::Blog => "Weekly, Monday morning",
        };
        let key_messages = args
            .key_messages
            .unwrap_or_else(|| vec![format!("Why {} matters now", args.topic)]);
        let content = args
            .content
            .unwrap_or_else(|| format!("{}: {}", args.topic, key_messages.join("; ")));

        let mut strategy = json!({
            "topic": args.topic,
            "platform": args.platform,
            "audience": args.audience.unwrap_or_else(|| "general audience".to_string()),
            "keyMessages": key_messages,
            "postingSchedule": schedule,
            "content": content,
        });
        // 未指定语气时不输出 tone，由编排器决定默认值
        if let Some(tone) = args.tone {
            strategy["tone"] = Value::String(tone);
        }
        Ok(strategy)
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FormatArgs {
    /// 待排版的正文
    pub content: String,
    /// 目标平台
    pub platform: Platform,
    /// 语气
    pub tone: String,
}

/// 排版工具：按平台规则生成最终文本与元数据
pub struct FormatTool;

#[async_trait]
impl Tool for FormatTool {
    fn name(&self) -> &str {
        "format_content"
    }

    fn description(&self) -> &str {
        "Format content for a platform in the given tone. Returns formattedContent and metadata."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<FormatArgs>()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<FormatArgs>(args)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: FormatArgs = parse_args(&args)?;
        let mut formatted = format!(
            "[{}] {} (in {} tone)",
            args.platform.as_str().to_uppercase(),
            args.content.trim(),
            args.tone
        );
        let mut truncated = false;
        if args.platform == Platform::Twitter && formatted.chars().count() > TWITTER_MAX_CHARS {
            formatted = formatted.chars().take(TWITTER_MAX_CHARS - 1).collect::<String>() + "…";
            truncated = true;
        }
        Ok(json!({
            "formattedContent": formatted,
            "metadata": {
                "platform": args.platform,
                "tone": args.tone,
                "characterCount": formatted.chars().count(),
                "truncated": truncated,
            }
        }))
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PublishArgs {
    /// 最终正文
    pub content: String,
    /// 排版阶段产出的元数据
    #[serde(default)]
    pub metadata: Option<Value>,
    /// 目标平台
    pub platform: Platform,
}

/// 发布工具：有副作用，每次调用都执行（不走缓存）
pub struct PublishTool;

#[async_trait]
impl Tool for PublishTool {
    fn name(&self) -> &str {
        "publish_content"
    }

    fn description(&self) -> &str {
        "Publish formatted content to the platform. Returns the document id and status."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PublishArgs>()
    }

    fn validate(&self, args: Value) -> Result<Value, String> {
        normalize_args::<PublishArgs>(args)
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: PublishArgs = parse_args(&args)?;
        let now = chrono::Utc::now();
        Ok(json!({
            "id": format!("doc_{}", now.timestamp_millis()),
            "status": "published",
            "platform": args.platform,
            "publishedAt": now.to_rfc3339(),
            "content": args.content,
            "metadata": args.metadata.unwrap_or(Value::Null),
        }))
    }
}
