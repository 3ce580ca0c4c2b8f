//! 状态通知：每轮迭代开始、每次出错、循环结束时各发一次快照

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 出错时 status 为 "error"，其余为当前阶段名
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub task: String,
    pub status: String,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 发出通知的组件名
    pub component: String,
}

/// 纯观察用回调，返回值不被消费
pub type StatusCallback = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;
