//! 工具注册表
//!
//! 两类能力：实现 Tool trait 的 provider（自带描述与参数 schema），以及直接注册的闭包（legacy callable）。
//! 查找时 provider 优先。注册只在构造期进行（&mut self），之后以 Arc<ToolRegistry> 只读共享给多个任务。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为扁平 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（指令中的 capability name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认表示无参数约束
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

/// 直接注册的同步能力
pub type ToolFn = Arc<dyn Fn(Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// list() 中每个能力的声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub description: String,
    pub parameters: Value,
}

/// get() 的返回：统一的调用入口
#[derive(Clone)]
pub enum ToolHandler {
    Provider(Arc<dyn Tool>),
    Legacy(ToolFn),
}

impl ToolHandler {
    pub async fn call(&self, args: Map<String, Value>) -> Result<Value, String> {
        match self {
            ToolHandler::Provider(tool) => tool.execute(args).await,
            ToolHandler::Legacy(f) => f(args),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    legacy: BTreeMap<String, ToolFn>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(&self, name: &str) -> Result<(), AgentError> {
        if self.tools.contains_key(name) || self.legacy.contains_key(name) {
            return Err(AgentError::DuplicateTool(name.to_string()));
        }
        Ok(())
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        self.ensure_free(&name)?;
        tracing::info!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), AgentError>
    where
        F: Fn(Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        self.ensure_free(&name)?;
        tracing::info!("Registering callable: {}", name);
        self.legacy.insert(name, Arc::new(f));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ToolHandler> {
        if let Some(tool) = self.tools.get(name) {
            return Some(ToolHandler::Provider(tool.clone()));
        }
        self.legacy.get(name).cloned().map(ToolHandler::Legacy)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name) || self.legacy.contains_key(name)
    }

    /// 所有能力的声明，按名称排序
    pub fn list(&self) -> BTreeMap<String, ToolSpec> {
        let mut out: BTreeMap<String, ToolSpec> = self
            .legacy
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    ToolSpec {
                        description: String::new(),
                        parameters: serde_json::json!({ "type": "object" }),
                    },
                )
            })
            .collect();
        for (name, tool) in &self.tools {
            out.insert(
                name.clone(),
                ToolSpec {
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                },
            );
        }
        out
    }

    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<Value, String> {
        let handler = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotRegistered(name.to_string()).to_string())?;
        handler.call(args).await
    }

    /// 能力清单 JSON，拼入 system prompt 与选择模式的提示
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .list()
            .into_iter()
            .map(|(name, spec)| {
                serde_json::json!({
                    "name": name,
                    "description": spec.description,
                    "parameters": spec.parameters
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[tokio::test]
    async fn test_provider_preferred_over_legacy_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        reg.register_fn("add", |args| {
            let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(serde_json::json!(a + b))
        })
        .unwrap();

        assert!(matches!(reg.get("echo"), Some(ToolHandler::Provider(_))));
        assert!(matches!(reg.get("add"), Some(ToolHandler::Legacy(_))));
        assert!(reg.get("missing").is_none());

        let mut args = Map::new();
        args.insert("a".into(), 2.into());
        args.insert("b".into(), 3.into());
        assert_eq!(reg.execute("add", args).await.unwrap(), serde_json::json!(5));
    }

    #[test]
    fn test_duplicate_name_rejected_across_kinds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        let err = reg.register_fn("echo", |_| Ok(Value::Null)).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "echo"));
    }

    #[tokio::test]
    async fn test_unknown_tool_message() {
        let reg = ToolRegistry::new();
        let err = reg.execute("ghost", Map::new()).await.unwrap_err();
        assert_eq!(err, "ghost is not registered");
    }

    #[test]
    fn test_list_includes_schema() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        let listed = reg.list();
        let echo = listed.get("echo").unwrap();
        assert!(echo.description.contains("Echo"));
        assert_eq!(echo.parameters["required"][0], "text");
        assert!(reg.to_schema_json().contains("\"echo\""));
    }
}
