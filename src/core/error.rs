//! Agent 错误类型
//!
//! 阶段处理函数返回的 AgentError 由控制器统一捕获并转入 error_recovery；
//! 只有配置类错误（Config / DuplicateTool）会在构造期向调用方传播。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Directive parse error: {0}")]
    DirectiveParse(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("{0} is not registered")]
    ToolNotRegistered(String),

    #[error("Tool {0} is already registered")]
    DuplicateTool(String),

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Execution stalled - no progress detected for {0} seconds")]
    Stalled(u64),

    #[error("Config error: {0}")]
    Config(String),
}
