//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / validate / execute），
//! 由 ToolRegistry 按名注册与查找；注册时一次性校验描述符（名称合法、不重名、schema 为 object）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDeclaration;

/// 工具类型：可执行，或终止标记（调用即视为最终答案，不再继续下一步）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Executable,
    Terminal,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、校验、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool_call 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（既告诉模型参数格式，也是 validate 的依据）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 校验并规范化参数；失败时返回原因，工具不会被执行
    fn validate(&self, args: Value) -> Result<Value, String> {
        Ok(args)
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Executable
    }

    /// 同一次运行内相同参数的结果能否复用；有副作用、必须每次执行的工具返回 false
    fn cacheable(&self) -> bool {
        true
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，保留注册顺序
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；名称非法、重名或 schema 不是 object 时拒绝
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), String> {
        self.register_arc(Arc::new(tool))
    }

    fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), String> {
        let name = tool.name().to_string();
        validate_name(&name)?;
        if self.tools.contains_key(&name) {
            return Err(format!("duplicate tool name: {name}"));
        }
        let schema = tool.parameters_schema();
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(format!("tool {name}: parameter schema must be an object"));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 生成传给模型的工具声明，顺序与注册顺序一致
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

/// OpenAI 兼容端点要求：1-64 个字符，仅字母数字、下划线、连字符
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err(format!("tool name must be 1-64 chars: {name:?}"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("tool name contains invalid characters: {name:?}"));
    }
    Ok(())
}
