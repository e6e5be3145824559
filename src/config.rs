//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUILL__*` 覆盖（双下划线表示嵌套，如 `QUILL__APP__DEFAULT_MODEL=deepseek:deepseek-chat`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    /// 各阶段 Agent 的覆盖项，键为 router / research / strategy / formatter / publisher / assistant
    pub agents: HashMap<String, AgentSection>,
    pub tracing: TracingSection,
}

/// [app] 段：应用名、默认模型、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 未在 [agents.*] 中单独指定时使用的模型（provider:model）
    pub default_model: String,
    /// Web 端保留的对话轮数
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            default_model: "openai:gpt-4o-mini".to_string(),
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与超时
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [agents.<name>] 段：单个 Agent 的模型与生成参数覆盖，未设置的字段使用内置默认值
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentSection {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_steps: Option<usize>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// [tracing] 段：外部 Trace 后端（Langfuse 兼容 ingestion API）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingSection {
    pub enabled: bool,
    pub endpoint: String,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    /// 短生命周期进程（CLI / serverless）在运行结束时必须 flush，否则缓冲的 trace 可能丢失
    pub flush_on_finish: bool,
    /// 常驻进程（quill-web）定时 flush 的间隔（秒）
    pub flush_interval_secs: u64,
    /// 缓冲事件数达到该值时立即 flush
    pub max_buffered_events: usize,
}

impl Default for TracingSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://cloud.langfuse.com".to_string(),
            public_key: None,
            secret_key: None,
            flush_on_finish: true,
            flush_interval_secs: 10,
            max_buffered_events: 1000,
        }
    }
}

impl AppConfig {
    /// 取某个 Agent 的覆盖项（无则为空）
    pub fn agent(&self, name: &str) -> AgentSection {
        self.agents.get(name).cloned().unwrap_or_default()
    }

    /// 某个 Agent 实际使用的模型标识
    pub fn model_for(&self, name: &str) -> String {
        self.agents
            .get(name)
            .and_then(|a| a.model.clone())
            .unwrap_or_else(|| self.app.default_model.clone())
    }
}

/// 从 config 目录加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
