//! 工具执行器
//!
//! 持有只读的 ToolRegistry 与全局超时。execute 永不向上抛错：未注册、handler 返回 Err、超时、panic
//! 全部转为带 status 字段的 ToolOutcome::Error；每次调用输出一行结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 一次能力调用的结果载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { tool: String, result: Value },
    Error { tool: String, error: String },
}

impl ToolOutcome {
    pub fn success(tool: impl Into<String>, result: Value) -> Self {
        ToolOutcome::Success {
            tool: tool.into(),
            result,
        }
    }

    pub fn error(tool: impl Into<String>, error: impl ToString) -> Self {
        ToolOutcome::Error {
            tool: tool.into(),
            error: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// 工具执行器：对每次调用施加超时并捕获 panic
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(&self, tool_name: &str, args: Map<String, Value>) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let (outcome, label) = match self.registry.get(tool_name) {
            None => (
                ToolOutcome::error(tool_name, AgentError::ToolNotRegistered(tool_name.to_string())),
                "not_registered",
            ),
            Some(handler) => {
                let call = AssertUnwindSafe(handler.call(args)).catch_unwind();
                match timeout(self.timeout, call).await {
                    Ok(Ok(Ok(value))) => (ToolOutcome::success(tool_name, value), "ok"),
                    Ok(Ok(Err(e))) => (
                        ToolOutcome::error(tool_name, AgentError::ToolExecutionFailed(e)),
                        "error",
                    ),
                    Ok(Err(panic)) => (
                        ToolOutcome::error(
                            tool_name,
                            AgentError::ToolExecutionFailed(panic_message(panic)),
                        ),
                        "panic",
                    ),
                    Err(_) => (
                        ToolOutcome::error(tool_name, AgentError::ToolTimeout(tool_name.to_string())),
                        "timeout",
                    ),
                }
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": !outcome.is_error(),
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        outcome
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::tools::{EchoTool, Tool};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        reg.register(SlowTool).unwrap();
        reg.register_fn("explode", |_| panic!("kaboom")).unwrap();
        reg.register_fn("fail", |_| Err("bad input".to_string())).unwrap();
        ToolExecutor {
            registry: Arc::new(reg),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_success_payload() {
        let mut args = Map::new();
        args.insert("text".into(), "hi".into());
        let out = executor().execute("echo", args).await;
        assert_eq!(out, ToolOutcome::success("echo", serde_json::json!({"text": "hi"})));
        assert_eq!(out.to_value()["status"], "success");
    }

    #[tokio::test]
    async fn test_unknown_tool_payload_names_tool() {
        let out = executor().execute("nope", Map::new()).await;
        assert!(out.is_error());
        let v = out.to_value();
        assert_eq!(v["status"], "error");
        assert!(v["error"].as_str().unwrap().contains("nope is not registered"));
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_captured() {
        let exec = executor();
        let failed = exec.execute("fail", Map::new()).await;
        assert!(failed.to_value()["error"].as_str().unwrap().contains("bad input"));

        let panicked = exec.execute("explode", Map::new()).await;
        assert!(panicked.to_value()["error"].as_str().unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_timeout_payload() {
        let out = executor().execute("slow", Map::new()).await;
        assert!(matches!(out, ToolOutcome::Error { ref error, .. } if error.contains("timeout")));
    }
}
