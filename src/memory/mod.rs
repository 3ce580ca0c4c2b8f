//! 记忆层：控制器使用的短期对话窗口

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
