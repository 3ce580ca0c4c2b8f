//! 执行控制器集成测试（Mock LLM，无网络）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use taskpilot::core::{ControllerConfig, ExecutionController, HistoryKind, TaskPhase};
    use taskpilot::llm::{MockLlmClient, ScriptedLlmClient};
    use taskpilot::tools::{EchoTool, ToolExecutor, ToolRegistry};

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry
            .register_fn("add", |args| {
                let a = args.get("a").and_then(|v| v.as_i64()).ok_or("a must be an integer")?;
                let b = args.get("b").and_then(|v| v.as_i64()).ok_or("b must be an integer")?;
                Ok(json!(a + b))
            })
            .unwrap();
        ToolExecutor::new(Arc::new(registry), 5)
    }

    fn config(max_iterations: u32) -> ControllerConfig {
        ControllerConfig {
            max_iterations,
            iteration_delay_ms: 0,
            ..ControllerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fibonacci_task_end_to_end() {
        let mut controller =
            ExecutionController::new(Arc::new(MockLlmClient), executor(), config(10)).unwrap();
        let record = controller
            .start("Create a Python function that calculates the Fibonacci sequence")
            .await;

        assert!(record.iterations <= 10);
        assert_eq!(record.status, TaskPhase::Completed);
        assert!(record.count_kind(HistoryKind::Plan) >= 1);
        assert!(
            record.count_kind(HistoryKind::Execution) + record.count_kind(HistoryKind::Review) >= 1
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["task"], "Create a Python function that calculates the Fibonacci sequence");
        assert_eq!(value["result"]["status"], "review_complete");
        assert!(value["execution_history"][0]["kind"] == "plan");
    }

    #[tokio::test]
    async fn test_legacy_callable_invoked_through_directive() {
        let llm = Arc::new(ScriptedLlmClient::replies([
            "1. Compute",
            "1. Add the numbers",
            "Assessed.",
            r#"Result: <<TOOL:add {"a": 2, "b": 3}>> and <<TOOL:add {"a": 1 "b"}>>"#,
        ]));
        let mut controller = ExecutionController::new(llm, executor(), config(2)).unwrap();
        let record = controller.start("add two numbers").await;

        let results: Vec<&str> = record
            .execution_history
            .iter()
            .filter(|h| h.kind == HistoryKind::ToolResult)
            .map(|h| h.content.as_str())
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("\"success\"") && results[0].contains('5'));
        assert!(results[1].contains("\"error\""));
        assert_eq!(record.error_count, 0);
    }

    #[tokio::test]
    async fn test_selection_mode_skips_directive_scan() {
        let llm = Arc::new(ScriptedLlmClient::replies([
            "1. Greet",
            "1. Say hi",
            "Assessed.",
            r#"{"use_tool": true, "tool_name": "echo", "parameters": {"text": "hey"}}"#,
        ]));
        let cfg = ControllerConfig {
            tool_selection: true,
            ..config(2)
        };
        let mut controller = ExecutionController::new(llm.clone(), executor(), cfg).unwrap();
        let record = controller.start("greet the user").await;

        assert_eq!(llm.calls(), 4);
        let call = record
            .execution_history
            .iter()
            .find(|h| h.kind == HistoryKind::ToolCall)
            .unwrap();
        assert_eq!(call.content, r#"<<TOOL:echo {"text":"hey"}>>"#);
        let execution = record
            .execution_history
            .iter()
            .find(|h| h.kind == HistoryKind::Execution)
            .unwrap();
        assert!(execution.content.contains("Selected tool: echo"));
        let status = controller.planner().execution_status().unwrap();
        assert_eq!(status.components[0].steps_completed, 1);
    }

    #[tokio::test]
    async fn test_controller_is_reusable_across_runs() {
        let mut controller =
            ExecutionController::new(Arc::new(MockLlmClient), executor(), config(3)).unwrap();
        let first = controller.start("first task").await;
        let second = controller.start("second task").await;

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.iterations, 3);
        assert_eq!(second.execution_history.len(), first.execution_history.len());
        assert_eq!(controller.planner().current_plan().unwrap().task, "second task");
    }
}
