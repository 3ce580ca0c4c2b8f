//! TaskPilot - 持续执行的 LLM 任务智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 执行控制器（阶段状态机、停滞检测、错误恢复）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话短期记忆
//! - **observability**: 日志初始化
//! - **planning**: 分层规划器与执行进度
//! - **tools**: 工具注册表、执行器、文本指令协议与一次性工具选择

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod tools;

pub use crate::core::{ControllerConfig, ExecutionController, TaskPhase, TaskRecord};
