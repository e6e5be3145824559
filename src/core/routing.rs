//! 路由决策
//!
//! router 阶段以结构化输出给出 RoutingDecision，编排器据此选择下游工作流。
//! 输出缺失或无法解析时不报错，退回最通用的工作流：create_content / blog。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 工作流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// 仅制定内容策略
    CreateStrategy,
    /// 完整内容创作：调研 -> 策略 -> 排版 -> 发布
    CreateContent,
    /// 管理已有内容（尚未实现）
    ManageContent,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::CreateStrategy => "create_strategy",
            Action::CreateContent => "create_content",
            Action::ManageContent => "manage_content",
        };
        f.write_str(s)
    }
}

/// 目标平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Twitter,
    Blog,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Blog => "blog",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 路由上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingContext {
    /// 内容主题
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// 已有策略 ID（在已有策略上继续创作时）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_strategy_id: Option<String>,
    /// 已有内容 ID（管理内容时）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    /// 额外要求
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
}

/// 路由决策：每个顶层请求生成一次，之后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingDecision {
    /// 选择的工作流
    pub action: Action,
    /// 目标平台
    pub platform: Platform,
    /// 请求上下文
    #[serde(default)]
    pub context: RoutingContext,
}

impl Default for RoutingDecision {
    fn default() -> Self {
        Self {
            action: Action::CreateContent,
            platform: Platform::Blog,
            context: RoutingContext::default(),
        }
    }
}

impl RoutingDecision {
    /// 宽松解析 router 输出：
    /// - 缺失或 action 无法解析 -> 默认决策（create_content / blog）
    /// - action 合法但 platform 无法解析 -> 保留 action，platform 退回 blog
    /// - context 无法解析 -> 空 context
    pub fn from_output(output: Option<&Value>) -> Self {
        let Some(obj) = output.and_then(Value::as_object) else {
            tracing::warn!("router produced no decision, using default workflow");
            return Self::default();
        };

        let Some(action) = obj
            .get("action")
            .and_then(|v| Action::deserialize(v).ok())
        else {
            tracing::warn!(output = ?obj.get("action"), "router action missing or invalid, using default workflow");
            return Self::default();
        };

        let platform = obj
            .get("platform")
            .and_then(|v| Platform::deserialize(v).ok())
            .unwrap_or(Platform::Blog);
        let context = obj
            .get("context")
            .and_then(|v| RoutingContext::deserialize(v).ok())
            .unwrap_or_default();

        Self {
            action,
            platform,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_decision() {
        let output = json!({
            "action": "create_content",
            "platform": "linkedin",
            "context": {"topic": "AI trends", "requirements": ["short"]}
        });
        let decision = RoutingDecision::from_output(Some(&output));
        assert_eq!(decision.action, Action::CreateContent);
        assert_eq!(decision.platform, Platform::Linkedin);
        assert_eq!(decision.context.topic.as_deref(), Some("AI trends"));
        assert_eq!(decision.context.requirements, Some(vec!["short".to_string()]));
    }

    #[test]
    fn test_missing_output_uses_default() {
        let decision = RoutingDecision::from_output(None);
        assert_eq!(decision, RoutingDecision::default());
        assert_eq!(decision.action, Action::CreateContent);
        assert_eq!(decision.platform, Platform::Blog);
    }

    #[test]
    fn test_malformed_action_uses_default() {
        for output in [
            json!({"action": "delete_everything", "platform": "twitter"}),
            json!({"platform": "twitter"}),
            json!("create_strategy"),
        ] {
            let decision = RoutingDecision::from_output(Some(&output));
            assert_eq!(decision.action, Action::CreateContent);
            assert_eq!(decision.platform, Platform::Blog);
        }
    }

    #[test]
    fn test_unknown_platform_keeps_action() {
        let output = json!({"action": "create_strategy", "platform": "myspace"});
        let decision = RoutingDecision::from_output(Some(&output));
        assert_eq!(decision.action, Action::CreateStrategy);
        assert_eq!(decision.platform, Platform::Blog);
    }
}
