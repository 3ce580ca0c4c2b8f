//! 分层规划器
//!
//! create_plan：一次调用拿到 component 编号列表，再为每个 component 调用一次拿到步骤列表。
//! adapt_plan 只追加新的 component，从不删除或重编号已有 component，已记录的进度因此不会失效。

use std::sync::Arc;

use chrono::Utc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::planning::parser::{parse_numbered_list, short_label};
use crate::planning::types::{
    ExecutionStatus, NextAction, Plan, PlanComponent, PlanHistoryEntry, PlanSummary,
    ReasoningResult, DEFAULT_STEP,
};

const RECOMMENDATION_MARKER: &str = "most promising";

const PLANNER_SYSTEM: &str = "You are a planning assistant. You break tasks into components and \
components into concrete, verifiable steps. Always answer with numbered lists when asked for a plan.";

struct PlanState {
    plan: Plan,
    status: ExecutionStatus,
}

pub struct HierarchicalPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    state: Option<PlanState>,
    history: Vec<PlanHistoryEntry>,
    adaptations: usize,
}

impl HierarchicalPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: PLANNER_SYSTEM.to_string(),
            state: None,
            history: Vec::new(),
            adaptations: 0,
        }
    }

    async fn ask(&self, prompt: String) -> Result<String, AgentError> {
        let messages = [Message::system(&self.system_prompt), Message::user(prompt)];
        Ok(self.llm.complete(&messages).await?)
    }

    pub async fn create_plan(&mut self, task: &str) -> Result<(Plan, ExecutionStatus), AgentError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(AgentError::PlanningFailed("task description is empty".into()));
        }
        tracing::info!("Creating hierarchical plan for task: {}", task);

        let high_level = self
            .ask(format!(
                r#"I need to create a hierarchical plan for this task:

{task}

First, break this down into major components or phases.
For each component:
1. Provide a clear name and description
2. Identify the key objectives
3. List any dependencies on other components

Format the response as a numbered list of components."#
            ))
            .await?;

        let items = parse_numbered_list(&high_level);
        let components = if items.is_empty() {
            tracing::warn!("no parseable components in planner output, using default component");
            vec![PlanComponent {
                name: format!("Component 1: {}", short_label(task)),
                description: task.to_string(),
                steps: vec![DEFAULT_STEP.to_string()],
            }]
        } else {
            let mut components = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let steps = self.detailed_steps(item, task).await?;
                components.push(PlanComponent {
                    name: format!("Component {}: {}", i + 1, short_label(item)),
                    description: item.clone(),
                    steps,
                });
            }
            components
        };

        let plan = Plan::new(task, components);
        let status = ExecutionStatus::for_plan(&plan);
        tracing::info!(
            components = plan.components.len(),
            steps = plan.total_steps(),
            "plan created"
        );
        self.history.push(PlanHistoryEntry::Created {
            task: task.to_string(),
            components: plan.component_names().iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        });
        self.state = Some(PlanState {
            plan: plan.clone(),
            status: status.clone(),
        });
        Ok((plan, status))
    }

    /// 为单个 component 生成步骤；模型没有给出编号步骤时以 component 描述本身作为唯一步骤
    async fn detailed_steps(&self, component: &str, task: &str) -> Result<Vec<String>, AgentError> {
        let response = self
            .ask(format!(
                r#"I'm working on this overall task:

{task}

I need to create a detailed plan for this component:

{component}

Please provide a step-by-step plan that:
1. Breaks down the component into specific, actionable steps
2. Identifies any tools or resources needed for each step
3. Specifies how to verify each step is completed correctly

Format the response as a numbered list of steps."#
            ))
            .await?;
        let steps = parse_numbered_list(&response);
        if steps.is_empty() {
            Ok(vec![component.to_string()])
        } else {
            Ok(steps)
        }
    }

    /// 规划失败时由调用方装入最小计划
    pub fn install_plan(&mut self, plan: Plan) -> ExecutionStatus {
        let status = ExecutionStatus::for_plan(&plan);
        self.history.push(PlanHistoryEntry::Created {
            task: plan.task.clone(),
            components: plan.component_names().iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        });
        self.state = Some(PlanState {
            plan,
            status: status.clone(),
        });
        status
    }

    pub fn get_next_action(&mut self) -> NextAction {
        match self.state.as_mut() {
            Some(PlanState { plan, status }) => status.next_action(plan),
            None => NextAction::CreatePlan,
        }
    }

    pub fn update_step_status(
        &mut self,
        component: &str,
        step_index: usize,
        completed: bool,
    ) -> Result<(), AgentError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| AgentError::UnknownComponent(component.to_string()))?;
        state.status.update_step(component, step_index, completed)
    }

    pub async fn adapt_plan(&mut self, feedback: &str) -> Result<Plan, AgentError> {
        let (task, names) = match &self.state {
            Some(s) => (s.plan.task.clone(), s.plan.component_names().join(", ")),
            None => return Err(AgentError::PlanningFailed("no current plan to adapt".into())),
        };
        tracing::info!("Adapting plan based on feedback: {}", feedback);

        let recommendations = self
            .ask(format!(
                r#"I'm working on this task:

{task}

My current plan has these components:

{names}

I've received this feedback or new information:

{feedback}

I need to adapt my plan. Please help me:
1. Identify which components need to be modified
2. Specify what changes are needed
3. Determine if any new components should be added

Provide specific recommendations for adapting the plan."#
            ))
            .await?;

        let steps = self.detailed_steps(feedback, &task).await?;
        self.adaptations += 1;
        let name = format!("Adaptation {}: {}", self.adaptations, short_label(feedback));

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| AgentError::PlanningFailed("plan disappeared during adaptation".into()))?;
        state.status.push_pending(&name, steps.len());
        state.plan.components.push(PlanComponent {
            name: name.clone(),
            description: feedback.to_string(),
            steps,
        });

        self.history.push(PlanHistoryEntry::Adapted {
            feedback: feedback.to_string(),
            recommendations,
            component: name,
            timestamp: Utc::now(),
        });
        Ok(state.plan.clone())
    }

    pub async fn reason_about_approach(&self, problem: &str) -> Result<ReasoningResult, AgentError> {
        tracing::info!("Reasoning about approach for problem: {}", problem);
        let analysis = self
            .ask(format!(
                r#"I need to reason about how to approach this problem:

{problem}

Please help me think through:
1. What are the key aspects or dimensions of this problem?
2. What are different possible approaches to solving it?
3. What are the trade-offs between these approaches?
4. Which approach seems most promising and why?

Provide a structured analysis."#
            ))
            .await?;

        Ok(ReasoningResult {
            problem: problem.to_string(),
            recommended_approach: extract_recommendation(&analysis),
            analysis,
            timestamp: Utc::now(),
        })
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.state.as_ref().map(|s| &s.plan)
    }

    pub fn execution_status(&self) -> Option<&ExecutionStatus> {
        self.state.as_ref().map(|s| &s.status)
    }

    pub fn plan_summary(&self) -> Option<PlanSummary> {
        self.state
            .as_ref()
            .map(|s| PlanSummary::build(&s.plan, &s.status))
    }

    pub fn plan_history(&self) -> &[PlanHistoryEntry] {
        &self.history
    }
}

/// 含推荐短语那一行的下一行原样返回；找不到则为空串
fn extract_recommendation(analysis: &str) -> String {
    let lines: Vec<&str> = analysis.lines().collect();
    lines
        .iter()
        .position(|l| l.to_lowercase().contains(RECOMMENDATION_MARKER))
        .and_then(|i| lines.get(i + 1))
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}
