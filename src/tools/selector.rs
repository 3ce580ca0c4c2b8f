//! 一次性能力选择
//!
//! 给定自然语言输入与注册表的能力清单，单次模型调用直接决定「是否调用、调用谁、参数是什么」。
//! 选中时本轮跳过自由文本指令扫描；模型失败、回复无法解析或选了不存在的能力，都视为「不调用」。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::schema::{selection_schema_json, SelectionReply};
use crate::tools::ToolRegistry;

const SELECTOR_SYSTEM: &str =
    "You are a tool selection assistant that helps determine which tool to use for a given user input.";

/// 模型选中的能力与参数
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

pub struct ToolSelector {
    llm: Arc<dyn LlmClient>,
}

impl ToolSelector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(input: &str, registry: &ToolRegistry) -> String {
        let tool_lines = registry
            .list()
            .iter()
            .map(|(name, spec)| format!("- {}: {}", name, spec.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            r#"You are a tool selection assistant. Analyze the message and decide whether it should use one of the available tools.

Available tools:
{tool_lines}

Tool parameter schemas:
{schemas}

Message: "{input}"

If no tool is needed respond with: {{"use_tool": false}}
Otherwise respond with a JSON object matching this schema:
{reply_schema}

Respond with valid JSON only, no additional text."#,
            schemas = registry.to_schema_json(),
            reply_schema = selection_schema_json(),
        )
    }

    pub async fn select(&self, input: &str, registry: &ToolRegistry) -> Option<ToolSelection> {
        if registry.list().is_empty() {
            return None;
        }
        let messages = [
            Message::system(SELECTOR_SYSTEM),
            Message::user(Self::build_prompt(input, registry)),
        ];
        let reply = match self.llm.complete(&messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("tool selection call failed: {}", e);
                return None;
            }
        };
        let parsed: SelectionReply = match serde_json::from_str(extract_json(&reply)) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("tool selection reply is not valid JSON: {}", e);
                return None;
            }
        };
        if !parsed.use_tool {
            tracing::debug!("model decided no tool is needed");
            return None;
        }
        let name = parsed.tool_name?;
        if !registry.contains(&name) {
            tracing::warn!("model selected unregistered tool: {}", name);
            return None;
        }
        tracing::info!(tool = %name, "model selected tool");
        Some(ToolSelection {
            tool_name: name,
            parameters: parsed.parameters,
        })
    }
}

/// 取出 ```json 代码块或首尾花括号之间的内容
fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::EchoTool;

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool).unwrap();
        reg
    }

    #[tokio::test]
    async fn test_selects_registered_tool() {
        let llm = Arc::new(ScriptedLlmClient::replies([
            "```json\n{\"use_tool\": true, \"tool_name\": \"echo\", \"parameters\": {\"text\": \"hi\"}}\n```",
        ]));
        let sel = ToolSelector::new(llm.clone())
            .select("say hi", &registry())
            .await
            .unwrap();
        assert_eq!(sel.tool_name, "echo");
        assert_eq!(sel.parameters["text"], "hi");
        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("- echo:"));
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_declined() {
        let reg = registry();
        let unknown = ToolSelector::new(Arc::new(ScriptedLlmClient::replies([
            r#"{"use_tool": true, "tool_name": "browser"}"#,
        ])));
        assert!(unknown.select("x", &reg).await.is_none());

        let declined =
            ToolSelector::new(Arc::new(ScriptedLlmClient::replies([r#"{"use_tool": false}"#])));
        assert!(declined.select("x", &reg).await.is_none());

        let garbage = ToolSelector::new(Arc::new(ScriptedLlmClient::replies(["no idea"])));
        assert!(garbage.select("x", &reg).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_registry_skips_model_call() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let out = ToolSelector::new(llm.clone())
            .select("x", &ToolRegistry::new())
            .await;
        assert!(out.is_none());
        assert_eq!(llm.calls(), 0);
    }
}
