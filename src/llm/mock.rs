//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：按提示中的关键短语返回固定文本，能把一个任务完整跑到 completed
//! - ScriptedLlmClient：按顺序吐出预置回复，并记录每次请求，便于断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// 规则型 Mock：取最后一条 User 消息，按关键短语选择回复
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn reply_for(prompt: &str) -> String {
        let p = prompt.to_lowercase();
        let reply = if p.contains("tool selection assistant") {
            r#"{"use_tool": false}"#
        } else if p.contains("detailed plan for this component") {
            "1. Work out the inputs and expected output\n2. Carry out the work and check the result"
        } else if p.contains("major components") {
            "1. Design: outline the approach\n2. Implementation: produce the result\n3. Verification: check the result against the task"
        } else if p.contains("adapt my plan") {
            "Add a component that addresses the feedback."
        } else if p.contains("reason about how to approach") {
            "The problem has a few dimensions.\nThe most promising approach is:\nSolve it incrementally and verify each part."
        } else if p.contains("review my work") {
            "All requirements fulfilled. The task is complete."
        } else if p.contains("all planned steps are complete") {
            "Task completed: every planned step has been carried out."
        } else if p.contains("execute the next step") {
            "Carried out the current step."
        } else if p.contains("encountered an error") {
            "The failure looks transient. Resume from the last good step."
        } else if p.contains("assess the current state") {
            "Progress reviewed. Continue with the next pending step."
        } else {
            "Acknowledged."
        };
        reply.to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Self::reply_for(last_user))
    }
}

/// 脚本型 Mock：依次返回预置结果；脚本耗尽后使用 fallback（未设置则返回 EmptyResponse）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 全部成功回复的便捷构造
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 每次调用收到的消息列表
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => self.fallback.clone().ok_or(LlmError::EmptyResponse),
        }
    }
}
