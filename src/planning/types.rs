//! 计划与执行状态
//!
//! Plan 是两级分解（component -> steps），ExecutionStatus 是与之一一对应的进度表。
//! 选择规则与进度计算都在这里，planner 只负责和模型打交道。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub const FALLBACK_STEPS: [&str; 2] = ["Analyze the task", "Execute the task step by step"];
pub const DEFAULT_STEP: &str = "execute the task";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanComponent {
    /// 唯一名称：`Component <序号>: <短标签>`
    pub name: String,
    /// 模型给出的完整描述
    pub description: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task: String,
    /// 插入顺序即展示顺序与执行优先级
    pub components: Vec<PlanComponent>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(task: impl Into<String>, components: Vec<PlanComponent>) -> Self {
        Self {
            task: task.into(),
            components,
            created_at: Utc::now(),
        }
    }

    /// 规划调用失败时使用的最小计划
    pub fn fallback(task: impl Into<String>) -> Self {
        Self::new(
            task,
            vec![PlanComponent {
                name: "Component 1: Fallback".to_string(),
                description: "Fallback plan".to_string(),
                steps: FALLBACK_STEPS.iter().map(|s| s.to_string()).collect(),
            }],
        )
    }

    pub fn component(&self, name: &str) -> Option<&PlanComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn total_steps(&self) -> usize {
        self.components.iter().map(|c| c.steps.len()).sum()
    }

    /// 多行文本形式，写入执行历史的 plan 条目
    pub fn render(&self) -> String {
        let mut out = format!("Plan for: {}", self.task);
        for c in &self.components {
            out.push_str(&format!("\n{}", c.name));
            for (i, step) in c.steps.iter().enumerate() {
                out.push_str(&format!("\n  {}. {}", i + 1, step));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    /// steps_completed / total_steps，取值 [0, 1]
    pub progress: f64,
    pub steps_completed: usize,
    pub total_steps: usize,
    /// 下一个要尝试的步骤（0 起）
    pub current_step: usize,
    pub status: ComponentState,
}

impl ComponentStatus {
    fn pending(name: &str, total_steps: usize) -> Self {
        Self {
            name: name.to_string(),
            progress: 0.0,
            steps_completed: 0,
            total_steps,
            current_step: 0,
            status: ComponentState::Pending,
        }
    }

    fn recompute(&mut self) {
        self.progress = if self.total_steps == 0 {
            0.0
        } else {
            self.steps_completed as f64 / self.total_steps as f64
        };
    }
}

/// 计划的下一步动作
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    CreatePlan,
    PlanCompleted,
    ComponentCompleted {
        component: String,
    },
    ExecuteStep {
        component: String,
        step_index: usize,
        step: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub task: String,
    /// 各 component progress 的算术平均
    pub overall_progress: f64,
    pub components: Vec<ComponentStatus>,
}

impl ExecutionStatus {
    pub fn for_plan(plan: &Plan) -> Self {
        Self {
            task: plan.task.clone(),
            overall_progress: 0.0,
            components: plan
                .components
                .iter()
                .map(|c| ComponentStatus::pending(&c.name, c.steps.len()))
                .collect(),
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.name == name)
    }

    pub(crate) fn push_pending(&mut self, name: &str, total_steps: usize) {
        self.components.push(ComponentStatus::pending(name, total_steps));
        self.recompute_overall();
    }

    pub fn recompute_overall(&mut self) {
        self.overall_progress = if self.components.is_empty() {
            0.0
        } else {
            self.components.iter().map(|c| c.progress).sum::<f64>() / self.components.len() as f64
        };
    }

    /// 按插入顺序取第一个 pending / in_progress 的 component。
    /// 未提交新进度时重复调用返回同一个 ExecuteStep。
    pub fn next_action(&mut self, plan: &Plan) -> NextAction {
        let Some(idx) = self
            .components
            .iter()
            .position(|c| c.status != ComponentState::Completed)
        else {
            self.overall_progress = 1.0;
            return NextAction::PlanCompleted;
        };

        let entry = &mut self.components[idx];
        if entry.current_step >= entry.total_steps {
            entry.status = ComponentState::Completed;
            entry.progress = 1.0;
            let component = entry.name.clone();
            self.recompute_overall();
            return NextAction::ComponentCompleted { component };
        }

        entry.status = ComponentState::InProgress;
        let step = plan
            .component(&entry.name)
            .and_then(|c| c.steps.get(entry.current_step))
            .cloned()
            .unwrap_or_default();
        NextAction::ExecuteStep {
            component: entry.name.clone(),
            step_index: entry.current_step,
            step,
        }
    }

    /// completed = true 时 steps_completed 恰好加一（不超过 total_steps）；
    /// step_index 仅作记录，计数以 steps_completed 为准
    pub fn update_step(
        &mut self,
        component: &str,
        step_index: usize,
        completed: bool,
    ) -> Result<(), AgentError> {
        let entry = self
            .components
            .iter_mut()
            .find(|c| c.name == component)
            .ok_or_else(|| AgentError::UnknownComponent(component.to_string()))?;

        if completed && entry.steps_completed < entry.total_steps {
            entry.steps_completed += 1;
            entry.current_step = entry.steps_completed;
        } else if !completed {
            tracing::debug!(component, step_index, "step attempt recorded without progress");
        }
        entry.recompute();
        self.recompute_overall();
        Ok(())
    }
}

/// planner 自己的计划日志，与任务执行历史分开
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanHistoryEntry {
    Created {
        task: String,
        components: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Adapted {
        feedback: String,
        recommendations: String,
        component: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub progress: f64,
    pub status: ComponentState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub task: String,
    pub overall_progress: f64,
    pub components: Vec<ComponentSummary>,
    pub created_at: DateTime<Utc>,
}

impl PlanSummary {
    pub fn build(plan: &Plan, status: &ExecutionStatus) -> Self {
        let components = plan
            .components
            .iter()
            .map(|c| {
                let st = status.component(&c.name);
                ComponentSummary {
                    name: c.name.clone(),
                    total_steps: c.steps.len(),
                    completed_steps: st.map(|s| s.steps_completed).unwrap_or(0),
                    progress: st.map(|s| s.progress).unwrap_or(0.0),
                    status: st.map(|s| s.status).unwrap_or(ComponentState::Pending),
                }
            })
            .collect();
        Self {
            task: plan.task.clone(),
            overall_progress: status.overall_progress,
            components,
            created_at: plan.created_at,
        }
    }
}

/// reason_about_approach 的结果；recommended_approach 是尽力提取，可能为空
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningResult {
    pub problem: String,
    pub analysis: String,
    pub recommended_approach: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(steps: &[usize]) -> Plan {
        Plan::new(
            "t",
            steps
                .iter()
                .enumerate()
                .map(|(i, n)| PlanComponent {
                    name: format!("Component {}: c{}", i + 1, i + 1),
                    description: String::new(),
                    steps: (0..*n).map(|s| format!("step {s}")).collect(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_overall_is_mean_of_components() {
        let plan = plan_with(&[2, 3, 1]);
        let mut status = ExecutionStatus::for_plan(&plan);
        let names: Vec<String> = plan.component_names().iter().map(|s| s.to_string()).collect();
        status.update_step(&names[0], 0, true).unwrap();
        status.update_step(&names[0], 1, true).unwrap();
        status.update_step(&names[1], 0, true).unwrap();

        let progress: Vec<f64> = status.components.iter().map(|c| c.progress).collect();
        assert!((progress[0] - 1.0).abs() < 1e-9);
        assert!((progress[1] - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(progress[2], 0.0);
        assert!((status.overall_progress - 4.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_action_is_idempotent_and_ordered() {
        let plan = plan_with(&[1, 1]);
        let mut status = ExecutionStatus::for_plan(&plan);
        let first = status.next_action(&plan);
        assert_eq!(first, status.next_action(&plan));
        assert!(matches!(
            &first,
            NextAction::ExecuteStep { component, step_index: 0, .. } if component == "Component 1: c1"
        ));
        assert_eq!(status.components[0].status, ComponentState::InProgress);
        assert_eq!(status.components[1].status, ComponentState::Pending);

        status.update_step("Component 1: c1", 0, true).unwrap();
        assert_eq!(
            status.next_action(&plan),
            NextAction::ComponentCompleted { component: "Component 1: c1".into() }
        );
        assert!(matches!(
            status.next_action(&plan),
            NextAction::ExecuteStep { component, .. } if component == "Component 2: c2"
        ));
        status.update_step("Component 2: c2", 0, true).unwrap();
        assert!(matches!(status.next_action(&plan), NextAction::ComponentCompleted { .. }));
        assert_eq!(status.next_action(&plan), NextAction::PlanCompleted);
        assert_eq!(status.overall_progress, 1.0);
    }

    #[test]
    fn test_completed_component_never_revisited() {
        let plan = plan_with(&[1, 2]);
        let mut status = ExecutionStatus::for_plan(&plan);
        status.next_action(&plan);
        status.update_step("Component 1: c1", 0, true).unwrap();
        status.next_action(&plan);
        for _ in 0..3 {
            if let NextAction::ExecuteStep { component, .. } = status.next_action(&plan) {
                assert_ne!(component, "Component 1: c1");
            }
        }
        let in_progress = status
            .components
            .iter()
            .filter(|c| c.status == ComponentState::InProgress)
            .count();
        assert_eq!(in_progress, 1);
    }

    #[test]
    fn test_failed_attempt_does_not_advance() {
        let plan = plan_with(&[2]);
        let mut status = ExecutionStatus::for_plan(&plan);
        status.update_step("Component 1: c1", 0, false).unwrap();
        assert_eq!(status.components[0].steps_completed, 0);
        assert_eq!(status.components[0].current_step, 0);
        assert!(status.update_step("nope", 0, true).is_err());
    }

    #[test]
    fn test_steps_completed_is_capped() {
        let plan = plan_with(&[1]);
        let mut status = ExecutionStatus::for_plan(&plan);
        status.update_step("Component 1: c1", 0, true).unwrap();
        status.update_step("Component 1: c1", 1, true).unwrap();
        assert_eq!(status.components[0].steps_completed, 1);
        assert_eq!(status.components[0].progress, 1.0);
    }

    #[test]
    fn test_fallback_plan_shape() {
        let plan = Plan::fallback("do it");
        assert_eq!(plan.components.len(), 1);
        assert_eq!(plan.components[0].steps.len(), 2);
        assert!(plan.render().contains("1. Analyze the task"));
    }
}
