//! 工具指令协议
//!
//! 模型在自由文本中内嵌 `<<TOOL:name {"param": "value"}>>`。流程：
//! detect（解析出全部指令，记录各自字节区间）-> execute（逐个解析执行，失败只影响该指令）
//! -> splice（按区间把指令替换为「调用 + 结果」块）。
//!
//! 解析隔离在 DirectiveParser 之后，换成结构化输出模式时控制器无需改动。

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::{ToolExecutor, ToolOutcome};

pub const DIRECTIVE_OPEN: &str = "<<TOOL:";
pub const DIRECTIVE_CLOSE: &str = ">>";

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"<<TOOL:([A-Za-z0-9_.\-]+)").expect("directive marker pattern"))
}

/// 从一次模型回复中解析出的单条指令
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub capability: String,
    /// 参数解析失败时为 Err(原因)，仅影响这一条指令
    pub arguments: Result<Map<String, Value>, String>,
    /// 原文中的指令文本
    pub source: String,
    /// source 在原文中的字节区间
    pub span: Range<usize>,
}

impl Directive {
    /// 去掉定界符后的指令内容，如 `echo {"text": "hi"}`
    pub fn inner_text(&self) -> &str {
        let s = self.source.strip_prefix(DIRECTIVE_OPEN).unwrap_or(&self.source);
        s.strip_suffix(DIRECTIVE_CLOSE).unwrap_or(s).trim()
    }
}

/// 「从文本中提取结构化调用」的统一接口
pub trait DirectiveParser: Send + Sync {
    fn extract(&self, text: &str) -> Vec<Directive>;
}

/// 默认实现：`<<TOOL:name {json}>>` 定界符格式
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerDirectiveParser;

impl DirectiveParser for MarkerDirectiveParser {
    fn extract(&self, text: &str) -> Vec<Directive> {
        let mut out = Vec::new();
        let mut cursor = 0;

        while let Some(caps) = marker().captures_at(text, cursor) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            let start = whole.start();
            let body_start = skip_whitespace(text, whole.end());
            let rest = &text[body_start..];

            let (arguments, end) = if rest.starts_with(DIRECTIVE_CLOSE) {
                (Ok(Map::new()), body_start + DIRECTIVE_CLOSE.len())
            } else {
                parse_arguments(text, body_start)
            };

            out.push(Directive {
                capability: name.as_str().to_string(),
                arguments,
                source: text[start..end].to_string(),
                span: start..end,
            });
            cursor = end.max(whole.end());
        }

        out
    }
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    from + (text[from..].len() - text[from..].trim_start().len())
}

/// 从 body_start 起解析一个 JSON 值；返回 (参数, 指令结束位置)
fn parse_arguments(text: &str, body_start: usize) -> (Result<Map<String, Value>, String>, usize) {
    let mut stream = serde_json::Deserializer::from_str(&text[body_start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            let json_end = body_start + stream.byte_offset();
            let after = skip_whitespace(text, json_end);
            let end = if text[after..].starts_with(DIRECTIVE_CLOSE) {
                after + DIRECTIVE_CLOSE.len()
            } else {
                json_end
            };
            let arguments = match value {
                Value::Object(map) => Ok(map),
                other => Err(format!("arguments must be a JSON object, got {other}")),
            };
            (arguments, end)
        }
        Some(Err(e)) => (Err(e.to_string()), malformed_end(text, body_start)),
        None => (
            Err("missing argument block".to_string()),
            malformed_end(text, body_start),
        ),
    }
}

/// 参数块无法解析时，指令延伸到下一个 `>>`；若先遇到下一条指令的 `<<TOOL:` 则停在它之前，
/// 两者都没有则到文本末尾
fn malformed_end(text: &str, body_start: usize) -> usize {
    let rest = &text[body_start..];
    let close = rest.find(DIRECTIVE_CLOSE);
    let next_open = rest.find(DIRECTIVE_OPEN);
    match (close, next_open) {
        (Some(c), Some(o)) if o < c => body_start + rest[..o].trim_end().len(),
        (None, Some(o)) => body_start + rest[..o].trim_end().len(),
        (Some(c), _) => body_start + c + DIRECTIVE_CLOSE.len(),
        (None, None) => text.len(),
    }
}

/// 把指令渲染为 wire 格式
pub fn format_directive(capability: &str, args: &Map<String, Value>) -> String {
    format!(
        "{DIRECTIVE_OPEN}{capability} {}{DIRECTIVE_CLOSE}",
        Value::Object(args.clone())
    )
}

/// 替换块中不能再出现完整的开始定界符，否则会被重复识别
fn neutralize(text: &str) -> String {
    text.replace(DIRECTIVE_OPEN, "<< TOOL:")
}

fn render_block(directive: &Directive, outcome: &ToolOutcome) -> String {
    neutralize(&format!(
        "[Tool call: {}]\n[Tool result]\n```json\n{}\n```",
        directive.inner_text(),
        outcome.to_pretty()
    ))
}

/// 单条替换：区间与 source 吻合时按位置替换，否则退回替换第一次出现的 source
pub fn splice(original: &str, directive: &Directive, outcome: &ToolOutcome) -> String {
    let block = render_block(directive, outcome);
    let span = directive.span.clone();
    if original.get(span.clone()) == Some(directive.source.as_str()) {
        let mut out = String::with_capacity(original.len() + block.len());
        out.push_str(&original[..span.start]);
        out.push_str(&block);
        out.push_str(&original[span.end..]);
        out
    } else {
        original.replacen(&directive.source, &block, 1)
    }
}

/// 多条替换：按区间从后往前替换，前面指令的位置不受影响
pub fn splice_all(original: &str, calls: &[ResolvedCall]) -> String {
    let mut ordered: Vec<&ResolvedCall> = calls.iter().collect();
    ordered.sort_by_key(|c| std::cmp::Reverse(c.directive.span.start));
    ordered
        .into_iter()
        .fold(original.to_string(), |text, call| {
            splice(&text, &call.directive, &call.outcome)
        })
}

/// 已执行的指令与其结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    pub directive: Directive,
    pub outcome: ToolOutcome,
}

/// 一次回复处理后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResponse {
    /// 替换后的文本
    pub text: String,
    pub calls: Vec<ResolvedCall>,
}

impl ProcessedResponse {
    pub fn has_errors(&self) -> bool {
        self.calls.iter().any(|c| c.outcome.is_error())
    }
}

/// 协议入口：parser + executor
#[derive(Clone)]
pub struct ToolProtocol {
    parser: Arc<dyn DirectiveParser>,
    executor: ToolExecutor,
}

impl ToolProtocol {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            parser: Arc::new(MarkerDirectiveParser),
            executor,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DirectiveParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn detect(&self, text: &str) -> Vec<Directive> {
        self.parser.extract(text)
    }

    /// 执行一条指令；参数解析失败直接得到该指令的错误载荷
    pub async fn execute(&self, directive: &Directive) -> ToolOutcome {
        match &directive.arguments {
            Ok(args) => self.executor.execute(&directive.capability, args.clone()).await,
            Err(reason) => {
                tracing::warn!(tool = %directive.capability, "malformed directive: {}", reason);
                ToolOutcome::error(
                    &directive.capability,
                    AgentError::DirectiveParse(reason.clone()),
                )
            }
        }
    }

    /// detect + execute（按出现顺序）+ splice
    pub async fn process(&self, text: &str) -> ProcessedResponse {
        let directives = self.detect(text);
        let mut calls = Vec::with_capacity(directives.len());
        for directive in directives {
            let outcome = self.execute(&directive).await;
            calls.push(ResolvedCall { directive, outcome });
        }
        ProcessedResponse {
            text: splice_all(text, &calls),
            calls,
        }
    }
}
