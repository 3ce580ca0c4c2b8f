//! 规划层：分层计划、执行进度与编号列表解析

pub mod parser;
pub mod planner;
pub mod types;

pub use parser::{parse_numbered_list, short_label};
pub use planner::HierarchicalPlanner;
pub use types::{
    ComponentState, ComponentStatus, ComponentSummary, ExecutionStatus, NextAction, Plan,
    PlanComponent, PlanHistoryEntry, PlanSummary, ReasoningResult,
};
