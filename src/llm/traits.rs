//! LLM 客户端抽象
//!
//! 控制器只关心「消息列表进，文本出，或失败」。重试属于调用方策略：需要时用 RetryingLlmClient 包一层。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型调用失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("empty response")]
    EmptyResponse,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试配置：第 n 次重试前等待 base_delay * 2^n
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited { retry_after_ms } = err {
            return Duration::from_millis(*retry_after_ms);
        }
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 带指数退避的包装客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(attempt = attempt + 1, ?delay, "LLM call failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(LlmError::Exhausted {
                        attempts: attempt + 1,
                        last: e.to_string(),
                    })
                }
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failure() {
        let inner = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Request("boom".into())),
            Ok("hello".into()),
        ]));
        let client = RetryingLlmClient::new(inner.clone(), fast());
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "hello");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let inner = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Request("a".into())),
            Err(LlmError::Request("b".into())),
            Err(LlmError::Request("c".into())),
        ]));
        let client = RetryingLlmClient::new(inner.clone(), fast());
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Exhausted { attempts: 3, .. }));
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let cfg = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        let err = LlmError::EmptyResponse;
        assert_eq!(cfg.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(cfg.delay_for(2, &err), Duration::from_millis(400));
        let limited = LlmError::RateLimited { retry_after_ms: 7 };
        assert_eq!(cfg.delay_for(2, &limited), Duration::from_millis(7));
    }
}
