//! 任务运行状态：阶段、执行历史与终态记录
//!
//! execution_history 只追加不修改；终态记录携带完整历史，提示词只引用最近几条。

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 控制器状态机的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Planning,
    Executing,
    Reviewing,
    ErrorRecovery,
    Completed,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Planning => "planning",
            TaskPhase::Executing => "executing",
            TaskPhase::Reviewing => "reviewing",
            TaskPhase::ErrorRecovery => "error_recovery",
            TaskPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// 初始计划与 planning 阶段的评估
    Plan,
    ToolCall,
    ToolResult,
    Execution,
    Review,
    Error,
    Recovery,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Plan => "plan",
            HistoryKind::ToolCall => "tool_call",
            HistoryKind::ToolResult => "tool_result",
            HistoryKind::Execution => "execution",
            HistoryKind::Review => "review",
            HistoryKind::Error => "error",
            HistoryKind::Recovery => "recovery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 单次阶段处理的结果，最后一次成功的结果进入终态记录的 result 字段
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IterationOutcome {
    PlanningComplete {
        plan: String,
    },
    ExecutionStepComplete {
        response: String,
        tool_calls: usize,
    },
    ReviewComplete {
        is_complete: bool,
        review: String,
    },
    RecoveryComplete {
        recovery_plan: String,
    },
}

/// start() 的返回值；status 为循环退出时的阶段
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub run_id: Uuid,
    pub task: String,
    pub status: TaskPhase,
    pub iterations: u32,
    pub result: Option<IterationOutcome>,
    pub error_count: u32,
    pub execution_history: Vec<HistoryEntry>,
}

impl TaskRecord {
    pub fn is_completed(&self) -> bool {
        self.status == TaskPhase::Completed
    }

    pub fn count_kind(&self, kind: HistoryKind) -> usize {
        self.execution_history.iter().filter(|h| h.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_snake_case() {
        let v = serde_json::to_value(TaskPhase::ErrorRecovery).unwrap();
        assert_eq!(v, "error_recovery");
        assert_eq!(TaskPhase::ErrorRecovery.to_string(), "error_recovery");
    }

    #[test]
    fn test_outcome_tagged_by_status() {
        let v = serde_json::to_value(IterationOutcome::ReviewComplete {
            is_complete: true,
            review: "ok".into(),
        })
        .unwrap();
        assert_eq!(v["status"], "review_complete");
        assert_eq!(v["is_complete"], true);
    }
}
