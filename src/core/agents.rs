//! 内置 Agent 定义：router / research / strategy / formatter / publisher / assistant
//!
//! 提示词可在配置文件 `[agents.<name>]` 中覆盖；模型按 `agents.<name>.model`，缺省用 app.default_model。

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_model_from_config, ModelRef};
use crate::tools::{route_request_tool, FormatTool, PublishTool, ResearchTool, StrategyTool};

pub const ROUTER: &str = "router";
pub const RESEARCH: &str = "research";
pub const STRATEGY: &str = "strategy";
pub const FORMATTER: &str = "formatter";
pub const PUBLISHER: &str = "publisher";
pub const ASSISTANT: &str = "assistant";

const ROUTER_PROMPT: &str = "You route content requests. Decide which workflow fits the user's request: \
create_strategy (plan content only), create_content (research, plan, format and publish) or \
manage_content (work on existing content). Pick the target platform: linkedin, twitter or blog. \
Always answer by calling route_request exactly once.";

const RESEARCH_PROMPT: &str = "You are a research assistant. Use research_topic to gather references \
for the topic, then summarize the key findings briefly.";

const STRATEGY_PROMPT: &str = "You are a content strategist. Use create_strategy to plan the content: \
audience, tone, key messages and a draft of the content itself. Use the research findings when provided.";

const FORMATTER_PROMPT: &str = "You format content for publication. The input is JSON with content, \
platform and tone. Call format_content with exactly those values.";

const PUBLISHER_PROMPT: &str = "You publish content. The input is JSON with content, metadata and \
platform. Call publish_content with exactly those values, then confirm the publication.";

const ASSISTANT_PROMPT: &str = "You are Quill, a helpful writing assistant. Use research_topic when \
the user asks about a topic you need references for. Answer concisely.";

/// 流水线使用的五个 Agent
#[derive(Debug, Clone)]
pub struct ContentAgents {
    pub router: Agent,
    pub research: Agent,
    pub strategy: Agent,
    pub formatter: Agent,
    pub publisher: Agent,
}

impl ContentAgents {
    /// 所有 Agent 使用同一个模型（测试 / 单模型部署）
    pub fn with_model(model: ModelRef) -> Result<Self, AgentError> {
        Self::with_model_fn(|_| model.clone())
    }

    /// 按 Agent 名称选择模型，提示词与参数使用内置默认值
    pub fn with_model_fn(f: impl Fn(&str) -> ModelRef) -> Result<Self, AgentError> {
        Self::build(&AppConfig::default(), |name| Ok(f(name)))
    }

    /// 按配置为每个 Agent 解析模型并应用覆盖项
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        Self::build(cfg, |name| resolve_model(cfg, name))
    }

    fn build(
        cfg: &AppConfig,
        model_for: impl Fn(&str) -> Result<ModelRef, AgentError>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            router: router_agent(cfg, model_for(ROUTER)?)?,
            research: Agent::builder(RESEARCH, model_for(RESEARCH)?)
                .system_prompt(RESEARCH_PROMPT)
                .tool(ResearchTool)
                .apply(&cfg.agent(RESEARCH))
                .build()?,
            strategy: Agent::builder(STRATEGY, model_for(STRATEGY)?)
                .system_prompt(STRATEGY_PROMPT)
                .tool(StrategyTool)
                .apply(&cfg.agent(STRATEGY))
                .build()?,
            formatter: Agent::builder(FORMATTER, model_for(FORMATTER)?)
                .system_prompt(FORMATTER_PROMPT)
                .tool(FormatTool)
                .apply(&cfg.agent(FORMATTER))
                .build()?,
            publisher: Agent::builder(PUBLISHER, model_for(PUBLISHER)?)
                .system_prompt(PUBLISHER_PROMPT)
                .tool(PublishTool)
                .apply(&cfg.agent(PUBLISHER))
                .build()?,
        })
    }
}

fn router_agent(cfg: &AppConfig, model: ModelRef) -> Result<Agent, AgentError> {
    Agent::builder(ROUTER, model)
        .system_prompt(ROUTER_PROMPT)
        .tool(route_request_tool())
        .structured_output(true)
        .temperature(0.0)
        .apply(&cfg.agent(ROUTER))
        .build()
}

/// 单独对话用的通用助手（CLI chat / Web /api/chat）
pub fn assistant_agent(cfg: &AppConfig) -> Result<Agent, AgentError> {
    Agent::builder(ASSISTANT, resolve_model(cfg, ASSISTANT)?)
        .system_prompt(ASSISTANT_PROMPT)
        .tool(ResearchTool)
        .apply(&cfg.agent(ASSISTANT))
        .build()
}

fn resolve_model(cfg: &AppConfig, agent: &str) -> Result<ModelRef, AgentError> {
    let identifier = cfg.model_for(agent);
    create_model_from_config(&identifier, &cfg.llm)
        .map_err(|e| AgentError::Config(format!("agent {agent}: {e}")))
}
