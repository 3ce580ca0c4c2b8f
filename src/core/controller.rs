//! 执行控制器：阶段状态机主循环
//!
//! planning -> executing -> reviewing -> completed，任何阶段出错转入 error_recovery，恢复后回到 planning。
//! 每轮迭代只跑一个阶段处理函数；阶段函数返回的错误在循环内被吸收，调用方总能拿到 TaskRecord。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::events::{StatusCallback, StatusUpdate};
use crate::core::prompts;
use crate::core::recovery::{ProgressMonitor, StallVerdict};
use crate::core::state::{HistoryEntry, HistoryKind, IterationOutcome, TaskPhase, TaskRecord};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::ConversationMemory;
use crate::planning::{HierarchicalPlanner, NextAction, Plan};
use crate::tools::{format_directive, ToolExecutor, ToolProtocol, ToolSelector};

const COMPONENT: &str = "execution_controller";

/// [controller] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 迭代硬上限
    pub max_iterations: u32,
    pub iteration_delay_ms: u64,
    /// 无进度超过该秒数视为停滞
    pub stall_threshold_secs: u64,
    /// error_recovery 中停滞且错误数超过此值时放弃
    pub max_recovery_errors: u32,
    /// executing 提示引用的历史条数
    pub history_window: usize,
    /// planning 提示引用的历史条数
    pub planning_history_window: usize,
    /// executing 阶段先尝试一次性工具选择
    pub tool_selection: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            iteration_delay_ms: 1000,
            stall_threshold_secs: 300,
            max_recovery_errors: 3,
            history_window: 5,
            planning_history_window: 3,
            tool_selection: false,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config("controller.max_iterations must be > 0".into()));
        }
        if self.history_window == 0 || self.planning_history_window == 0 {
            return Err(AgentError::Config("controller history windows must be > 0".into()));
        }
        Ok(())
    }
}

/// 一次 start() 的可变状态，每次运行重新创建
struct TaskRun {
    task: String,
    phase: TaskPhase,
    iteration: u32,
    error_count: u32,
    history: Vec<HistoryEntry>,
    monitor: ProgressMonitor,
    memory: ConversationMemory,
    result: Option<IterationOutcome>,
}

pub struct ExecutionController {
    config: ControllerConfig,
    llm: Arc<dyn LlmClient>,
    planner: HierarchicalPlanner,
    protocol: ToolProtocol,
    selector: Option<ToolSelector>,
    system_prompt: String,
    context_turns: usize,
    callback: Option<StatusCallback>,
    run: TaskRun,
}

impl ExecutionController {
    /// 配置非法时返回 AgentError::Config
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        config: ControllerConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let selector = config
            .tool_selection
            .then(|| ToolSelector::new(Arc::clone(&llm)));
        let system_prompt = prompts::system_prompt(executor.registry());
        let context_turns = 10;
        let run = TaskRun::new(String::new(), &config, context_turns);
        Ok(Self {
            planner: HierarchicalPlanner::new(Arc::clone(&llm)),
            protocol: ToolProtocol::new(executor),
            llm,
            selector,
            system_prompt,
            context_turns,
            callback: None,
            run,
            config,
        })
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// 对话记忆保留的轮数
    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn with_protocol(mut self, protocol: ToolProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn planner(&self) -> &HierarchicalPlanner {
        &self.planner
    }

    pub fn phase(&self) -> TaskPhase {
        self.run.phase
    }

    pub fn iteration(&self) -> u32 {
        self.run.iteration
    }

    pub async fn start(&mut self, task: &str) -> TaskRecord {
        self.run = TaskRun::new(task.to_string(), &self.config, self.context_turns);
        self.planner = HierarchicalPlanner::new(Arc::clone(&self.llm));
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "Starting continuous execution loop for task: {}", task);

        self.initial_plan().await;

        let delay = Duration::from_millis(self.config.iteration_delay_ms);
        while self.should_continue() {
            self.run.iteration += 1;
            tracing::info!(
                iteration = self.run.iteration,
                phase = %self.run.phase,
                "Executing iteration"
            );
            self.notify(None);

            match self.execute_phase().await {
                Ok(outcome) => self.run.result = Some(outcome),
                Err(e) => self.handle_error(&e),
            }

            if self.run.phase == TaskPhase::Completed {
                tracing::info!("Task completed after {} iterations", self.run.iteration);
                break;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let record = TaskRecord {
            run_id,
            task: self.run.task.clone(),
            status: self.run.phase,
            iterations: self.run.iteration,
            result: self.run.result.clone(),
            error_count: self.run.error_count,
            execution_history: self.run.history.clone(),
        };
        self.notify_status(record.status.as_str(), None);
        record
    }

    /// 规划失败时装入两步兜底计划，运行继续
    async fn initial_plan(&mut self) {
        let task = self.run.task.clone();
        let plan = match self.planner.create_plan(&task).await {
            Ok((plan, _)) => {
                tracing::info!("Initial plan generated with {} steps", plan.total_steps());
                plan
            }
            Err(e) => {
                tracing::error!("Error generating initial plan: {}", e);
                self.run.error_count += 1;
                self.run.push(
                    HistoryKind::Error,
                    format!("Planning failed, using fallback plan: {e}"),
                );
                let plan = Plan::fallback(task);
                self.planner.install_plan(plan.clone());
                plan
            }
        };
        self.run.push(HistoryKind::Plan, plan.render());
        self.run.monitor.touch();
    }

    /// 是否进入下一轮；停滞时可能注入一次错误
    pub fn should_continue(&mut self) -> bool {
        if self.run.iteration >= self.config.max_iterations {
            tracing::warn!(
                "Maximum iterations ({}) reached, forcing termination",
                self.config.max_iterations
            );
            return false;
        }
        if self.run.phase == TaskPhase::Completed {
            return false;
        }
        match self.run.monitor.check(self.run.phase, self.run.error_count) {
            StallVerdict::Healthy => true,
            StallVerdict::GiveUp => {
                tracing::warn!(
                    error_count = self.run.error_count,
                    "Too many errors during recovery, giving up"
                );
                false
            }
            StallVerdict::Recover => {
                let secs = self.run.monitor.stall_threshold().as_secs();
                tracing::warn!("No progress detected for {} seconds", secs);
                self.handle_error(&AgentError::Stalled(secs));
                true
            }
        }
    }

    /// 计数、记录诊断信息、切到 error_recovery；从不向外抛出
    pub fn handle_error(&mut self, err: &AgentError) {
        self.run.error_count += 1;
        let trace = format!(
            "{err}\n{err:?}\nphase: {}, iteration: {}",
            self.run.phase, self.run.iteration
        );
        tracing::error!("Error in iteration {}: {}", self.run.iteration, err);
        self.run.push(HistoryKind::Error, trace);
        self.run.phase = TaskPhase::ErrorRecovery;
        self.run.monitor.touch();
        self.notify_status("error", Some(err.to_string()));
    }

    async fn execute_phase(&mut self) -> Result<IterationOutcome, AgentError> {
        match self.run.phase {
            TaskPhase::Planning => self.planning_step().await,
            TaskPhase::Executing => self.task_step().await,
            TaskPhase::Reviewing => self.review_step().await,
            TaskPhase::ErrorRecovery => self.recovery_step().await,
            TaskPhase::Completed => Err(AgentError::PlanningFailed(
                "no phase handler for a completed task".into(),
            )),
        }
    }

    async fn ask(&mut self, prompt: String) -> Result<String, AgentError> {
        let messages = self.run.memory.to_request(&self.system_prompt, &prompt);
        tracing::debug!(messages = messages.len(), prompt_chars = prompt.len(), "model call");
        let reply = self.llm.complete(&messages).await?;
        self.run.memory.push_turn(prompt, reply.clone());
        Ok(reply)
    }

    fn overall_progress(&self) -> f64 {
        self.planner
            .execution_status()
            .map(|s| s.overall_progress)
            .unwrap_or(0.0)
    }

    async fn planning_step(&mut self) -> Result<IterationOutcome, AgentError> {
        let prompt = prompts::planning_prompt(
            &self.run.task,
            self.run.iteration,
            self.overall_progress(),
            &self.run.history,
            self.config.planning_history_window,
        );
        let response = self.ask(prompt).await?;
        self.run.push(HistoryKind::Plan, response.clone());
        self.transition(TaskPhase::Executing);
        self.run.monitor.touch();
        Ok(IterationOutcome::PlanningComplete { plan: response })
    }

    /// 跳过 component_completed，直到拿到真正的下一步
    fn next_action(&mut self) -> Result<NextAction, AgentError> {
        loop {
            match self.planner.get_next_action() {
                NextAction::ComponentCompleted { component } => {
                    tracing::info!(component = %component, "component completed");
                }
                NextAction::CreatePlan => {
                    return Err(AgentError::PlanningFailed("no active plan".into()))
                }
                action => return Ok(action),
            }
        }
    }

    async fn task_step(&mut self) -> Result<IterationOutcome, AgentError> {
        let action = self.next_action()?;
        let prompt = prompts::execution_prompt(
            &self.run.task,
            self.run.iteration,
            &action,
            self.overall_progress(),
            &self.run.history,
            self.config.history_window,
        );

        let selection = match &self.selector {
            Some(selector) => {
                selector
                    .select(&prompt, self.protocol.executor().registry())
                    .await
            }
            None => None,
        };

        let (text, tool_calls, clean) = if let Some(sel) = selection {
            // 选择模式命中时本轮不再扫描文本指令
            let call = format_directive(&sel.tool_name, &sel.parameters);
            let outcome = self
                .protocol
                .executor()
                .execute(&sel.tool_name, sel.parameters)
                .await;
            self.run.push(HistoryKind::ToolCall, call.clone());
            self.run.push(HistoryKind::ToolResult, outcome.to_pretty());
            let text = format!("Selected tool: {}\n{}", sel.tool_name, outcome.to_pretty());
            self.run.memory.push_turn(prompt, text.clone());
            (text, 1, !outcome.is_error())
        } else {
            let response = self.ask(prompt).await?;
            let processed = self.protocol.process(&response).await;
            for call in &processed.calls {
                self.run.push(HistoryKind::ToolCall, call.directive.source.clone());
                self.run.push(HistoryKind::ToolResult, call.outcome.to_pretty());
            }
            (processed.text.clone(), processed.calls.len(), !processed.has_errors())
        };
        self.run.push(HistoryKind::Execution, text.clone());

        if let NextAction::ExecuteStep {
            component,
            step_index,
            ..
        } = &action
        {
            self.planner
                .update_step_status(component, *step_index, clean)?;
        }

        if prompts::is_completion_signal(&text) {
            self.transition(TaskPhase::Reviewing);
        }
        self.run.monitor.touch();
        Ok(IterationOutcome::ExecutionStepComplete {
            response: text,
            tool_calls,
        })
    }

    async fn review_step(&mut self) -> Result<IterationOutcome, AgentError> {
        let prompt = prompts::review_prompt(&self.run.task, self.run.iteration);
        let response = self.ask(prompt).await?;
        self.run.push(HistoryKind::Review, response.clone());

        let is_complete = prompts::is_completion_signal(&response);
        if is_complete {
            self.transition(TaskPhase::Completed);
            tracing::info!("Task marked as completed after review");
        } else {
            self.transition(TaskPhase::Executing);
            tracing::info!("Task returned to execution phase after review");
        }
        self.run.monitor.touch();
        Ok(IterationOutcome::ReviewComplete {
            is_complete,
            review: response,
        })
    }

    async fn recovery_step(&mut self) -> Result<IterationOutcome, AgentError> {
        let recent_error = self
            .run
            .history
            .iter()
            .rev()
            .find(|h| h.kind == HistoryKind::Error)
            .map(|h| h.content.clone());
        let prompt = prompts::recovery_prompt(
            &self.run.task,
            self.run.iteration,
            self.run.error_count,
            recent_error.as_deref(),
        );
        let response = self.ask(prompt).await?;
        self.run.push(HistoryKind::Recovery, response.clone());
        self.transition(TaskPhase::Planning);
        self.run.monitor.touch();
        Ok(IterationOutcome::RecoveryComplete {
            recovery_plan: response,
        })
    }

    fn transition(&mut self, to: TaskPhase) {
        if self.run.phase != to {
            tracing::info!(from = %self.run.phase, to = %to, "phase transition");
            self.run.phase = to;
        }
    }

    fn notify(&self, error: Option<String>) {
        self.notify_status(self.run.phase.as_str(), error);
    }

    fn notify_status(&self, status: &str, error: Option<String>) {
        if let Some(cb) = &self.callback {
            cb(&StatusUpdate {
                task: self.run.task.clone(),
                status: status.to_string(),
                iteration: self.run.iteration,
                timestamp: Utc::now(),
                error,
                component: COMPONENT.to_string(),
            });
        }
    }
}

impl TaskRun {
    fn new(task: String, config: &ControllerConfig, context_turns: usize) -> Self {
        Self {
            task,
            phase: TaskPhase::Planning,
            iteration: 0,
            error_count: 0,
            history: Vec::new(),
            monitor: ProgressMonitor::new(
                Duration::from_secs(config.stall_threshold_secs),
                config.max_recovery_errors,
            ),
            memory: ConversationMemory::new(context_turns),
            result: None,
        }
    }

    fn push(&mut self, kind: HistoryKind, content: impl Into<String>) {
        self.history.push(HistoryEntry::new(kind, content));
    }
}
