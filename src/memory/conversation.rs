//! 对话历史
//!
//! 调用方（编排器 / HTTP 客户端）持有的有序消息序列；Runner 只读，不修改。
//! ConversationMemory 保留最近 N 轮，超出时剪枝，供 Web 端截断入站历史。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息：id 由调用方提供，缺省时生成 uuid
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// 短期记忆：最近 N 轮对话（每轮含 user + assistant，故实际保留约 max_turns*2 条消息）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    /// 由已有消息构建，构建后立即剪枝
    pub fn from_messages(messages: Vec<Message>, max_turns: usize) -> Self {
        let mut memory = Self { messages, max_turns };
        memory.prune();
        memory
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 拆出末尾的 user 消息作为本轮输入，其余作为历史；最后一条不是 user 时返回 None
    pub fn split_last_user(mut self) -> Option<(Vec<Message>, Message)> {
        if self.messages.last()?.role != Role::User {
            return None;
        }
        let last = self.messages.pop()?;
        Some((self.messages, last))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 超出 max_turns*2 时丢弃最旧的消息，保留最近部分
    fn prune(&mut self) {
        if self.messages.len() > self.max_turns * 2 {
            let keep = self.max_turns * 2;
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_recent_turns() {
        let mut memory = ConversationMemory::new(1);
        memory.push(Message::user("a"));
        memory.push(Message::assistant("b"));
        memory.push(Message::user("c"));
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.messages()[0].content, "b");
    }

    #[test]
    fn test_split_last_user() {
        let memory = ConversationMemory::from_messages(
            vec![
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
            ],
            10,
        );
        let (history, last) = memory.split_last_user().unwrap();
        assert_eq!(last.content, "second");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_split_rejects_trailing_non_user() {
        let memory = ConversationMemory::from_messages(
            vec![Message::user("question"), Message::assistant("answer")],
            10,
        );
        assert!(memory.split_last_user().is_none());
        assert!(ConversationMemory::new(10).split_last_user().is_none());
    }

    #[test]
    fn test_message_id_defaults_when_missing() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(!msg.id.is_empty());
        assert_eq!(msg.role, Role::User);
    }
}
