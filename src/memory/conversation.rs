//! 短期记忆：对话窗口
//!
//! 控制器每轮向模型发送「system + 最近若干轮对话 + 本轮提示」，超出窗口的旧轮次自动剪枝，
//! 防止提示随迭代次数无界增长。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话窗口：最多保留 max_turns 轮（每轮 user + assistant 两条）
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

    /// 记录一轮完整交互
    pub fn push_turn(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.messages.push(Message::user(prompt));
        self.messages.push(Message::assistant(reply));
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 拼出一次模型调用的完整消息列表：system + 历史窗口 + 本轮 user
    pub fn to_request(&self, system: &str, prompt: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 2);
        out.push(Message::system(system));
        out.extend(self.messages.iter().cloned());
        out.push(Message::user(prompt));
        out
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
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
    fn test_prune_keeps_latest_turns() {
        let mut mem = ConversationMemory::new(2);
        for i in 0..5 {
            mem.push_turn(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(mem.len(), 4);
        assert_eq!(mem.messages()[0].content, "q3");
        assert_eq!(mem.messages()[3].content, "a4");
    }

    #[test]
    fn test_to_request_order() {
        let mut mem = ConversationMemory::new(4);
        mem.push_turn("earlier", "reply");
        let req = mem.to_request("sys", "now");
        assert_eq!(req.len(), 4);
        assert_eq!(req[0].role, Role::System);
        assert_eq!(req[1].content, "earlier");
        assert_eq!(req[3], Message::user("now"));
    }

    #[test]
    fn test_zero_window_keeps_nothing() {
        let mut mem = ConversationMemory::new(0);
        mem.push_turn("q", "a");
        assert!(mem.is_empty());
    }
}
