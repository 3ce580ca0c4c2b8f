//! 能力选择回复的 JSON Schema（schemars 生成）
//!
//! 选择模式下把该 schema 拼入提示，约束模型只输出一个合法的选择对象。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

/// 选择模式下模型应返回的对象
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectionReply {
    /// 是否需要调用能力；为 false 时其余字段忽略
    pub use_tool: bool,
    /// 选中的能力名，必须是清单中的某一项
    #[serde(default)]
    pub tool_name: Option<String>,
    /// 扁平参数对象
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

pub fn selection_schema_json() -> String {
    let schema = schema_for!(SelectionReply);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_fields() {
        let s = selection_schema_json();
        assert!(s.contains("use_tool"));
        assert!(s.contains("tool_name"));
        assert!(s.contains("parameters"));
    }
}
