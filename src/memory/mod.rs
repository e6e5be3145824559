//! 记忆层：调用方持有的对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
