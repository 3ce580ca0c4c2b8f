//! 各阶段提示词构建与完成信号检测
//!
//! 提示词只引用执行历史的最近几条，每条截断到 200 字符，保证提示长度有界。

use crate::core::state::HistoryEntry;
use crate::planning::NextAction;
use crate::tools::{ToolRegistry, DIRECTIVE_CLOSE, DIRECTIVE_OPEN};

const ENTRY_PREVIEW_CHARS: usize = 200;

/// 不区分大小写的子串匹配；只是启发式判断
pub const COMPLETION_PHRASES: [&str; 4] = [
    "task completed",
    "task is complete",
    "all steps completed",
    "requirements fulfilled",
];

pub fn is_completion_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLETION_PHRASES.iter().any(|p| lower.contains(p))
}

fn preview(content: &str) -> String {
    if content.chars().count() > ENTRY_PREVIEW_CHARS {
        format!("{}...", content.chars().take(ENTRY_PREVIEW_CHARS).collect::<String>())
    } else {
        content.to_string()
    }
}

/// 最近 window 条历史的摘要，历史为空时返回 None
pub fn summarize_history(history: &[HistoryEntry], window: usize) -> Option<String> {
    if history.is_empty() || window == 0 {
        return None;
    }
    let start = history.len().saturating_sub(window);
    Some(
        history[start..]
            .iter()
            .map(|h| format!("- {}: {}", h.kind.as_str(), preview(&h.content)))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn with_history(mut prompt: String, history: &[HistoryEntry], window: usize) -> String {
    if let Some(summary) = summarize_history(history, window) {
        prompt.push_str("\n\nRecent execution history:\n");
        prompt.push_str(&summary);
    }
    prompt
}

pub fn system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are an autonomous assistant working through a task step by step. \
         Be concrete and report what you did in each step.",
    );
    let tools = registry.list();
    if !tools.is_empty() {
        prompt.push_str(&format!(
            "\n\nYou can use tools by writing {DIRECTIVE_OPEN}tool_name {{\"param\": \"value\"}}{DIRECTIVE_CLOSE} \
             anywhere in your reply. The arguments must be a single JSON object.\n\nAvailable tools:"
        ));
        for (name, spec) in tools {
            prompt.push_str(&format!("\n- {}: {}", name, spec.description));
        }
    }
    prompt
}

pub fn planning_prompt(
    task: &str,
    iteration: u32,
    overall_progress: f64,
    history: &[HistoryEntry],
    window: usize,
) -> String {
    with_history(
        format!(
            "I am working on this task: {task}\n\n\
             Based on my current progress and the execution history, I need to:\n\
             1. Assess the current state of the task\n\
             2. Identify the next steps to take\n\
             3. Decide how to proceed in the next phase of execution\n\n\
             Current iteration: {iteration}\n\
             Overall progress: {:.0}%",
            overall_progress * 100.0
        ),
        history,
        window,
    )
}

pub fn execution_prompt(
    task: &str,
    iteration: u32,
    action: &NextAction,
    overall_progress: f64,
    history: &[HistoryEntry],
    window: usize,
) -> String {
    let focus = match action {
        NextAction::ExecuteStep {
            component,
            step_index,
            step,
        } => format!(
            "I need to execute the next step in my plan.\n\
             Current component: {component}\n\
             Current step ({}): {step}",
            step_index + 1
        ),
        _ => "All planned steps are complete. I need to confirm the result and state \
              whether the task is finished."
            .to_string(),
    };
    with_history(
        format!(
            "I am working on this task: {task}\n\n\
             {focus}\n\n\
             Current iteration: {iteration}\n\
             Overall progress: {:.0}%",
            overall_progress * 100.0
        ),
        history,
        window,
    )
}

pub fn review_prompt(task: &str, iteration: u32) -> String {
    format!(
        "I have been working on this task: {task}\n\n\
         I need to review my work to determine if the task is truly complete.\n\
         I should check:\n\
         1. Have all requirements been fulfilled?\n\
         2. Is there any part of the task that remains incomplete?\n\
         3. Are there any errors or issues that need to be addressed?\n\
         4. Is there any way to improve the result?\n\n\
         Current iteration: {iteration}"
    )
}

pub fn recovery_prompt(
    task: &str,
    iteration: u32,
    error_count: u32,
    recent_error: Option<&str>,
) -> String {
    let mut prompt = format!(
        "I encountered an error while working on this task: {task}\n\n\
         I need to:\n\
         1. Analyze what went wrong\n\
         2. Determine how to recover\n\
         3. Adjust my approach to avoid similar errors\n\n\
         Current iteration: {iteration}\n\
         Error count: {error_count}"
    );
    if let Some(err) = recent_error {
        prompt.push_str(&format!("\n\nMost recent error:\n{}", preview(err)));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::HistoryKind;

    #[test]
    fn test_completion_signal_is_case_insensitive() {
        assert!(is_completion_signal("All Requirements FULFILLED."));
        assert!(is_completion_signal("Task completed: done"));
        assert!(!is_completion_signal("The task is almost done"));
    }

    #[test]
    fn test_history_window_and_truncation() {
        let history: Vec<HistoryEntry> = (0..8)
            .map(|i| HistoryEntry::new(HistoryKind::Execution, format!("entry {i} {}", "x".repeat(300))))
            .collect();
        let summary = summarize_history(&history, 3).unwrap();
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.starts_with("- execution: entry 5"));
        assert!(summary.lines().all(|l| l.ends_with("...")));
        assert!(summarize_history(&[], 3).is_none());
    }

    #[test]
    fn test_execution_prompt_names_step() {
        let action = NextAction::ExecuteStep {
            component: "Component 1: Design".into(),
            step_index: 0,
            step: "Sketch it".into(),
        };
        let p = execution_prompt("t", 2, &action, 0.5, &[], 5);
        assert!(p.contains("execute the next step"));
        assert!(p.contains("Component 1: Design"));
        assert!(p.contains("Current step (1): Sketch it"));
        assert!(p.contains("Overall progress: 50%"));
        assert!(!p.contains("Recent execution history"));

        let done = execution_prompt("t", 3, &NextAction::PlanCompleted, 1.0, &[], 5);
        assert!(done.contains("All planned steps are complete"));
    }

    #[test]
    fn test_recovery_prompt_includes_error() {
        let p = recovery_prompt("t", 4, 2, Some("boom"));
        assert!(p.contains("Error count: 2"));
        assert!(p.ends_with("boom"));
    }
}
