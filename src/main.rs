//! TaskPilot 命令行入口
//!
//! 用法：`taskpilot [--config PATH] <task...>`，运行一次任务并以 JSON 打印终态记录。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use taskpilot::config::load_config;
use taskpilot::core::{ExecutionController, StatusCallback, StatusUpdate};
use taskpilot::llm::create_llm_from_config;
use taskpilot::observability;
use taskpilot::tools::{EchoTool, ToolExecutor, ToolRegistry};

fn parse_args() -> anyhow::Result<(Option<PathBuf>, String)> {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config requires a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            words.push(arg);
        }
    }
    if words.is_empty() {
        bail!("usage: taskpilot [--config PATH] <task...>");
    }
    Ok((config_path, words.join(" ")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, task) = parse_args()?;
    let cfg = load_config(config_path).context("Failed to load configuration")?;

    let llm = create_llm_from_config(&cfg);
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).context("Failed to register tools")?;
    let executor = ToolExecutor::new(Arc::new(registry), cfg.tools.tool_timeout_secs);

    let callback: StatusCallback = Arc::new(|u: &StatusUpdate| match &u.error {
        Some(err) => tracing::warn!(iteration = u.iteration, "status: {} ({})", u.status, err),
        None => tracing::info!(iteration = u.iteration, "status: {}", u.status),
    });
    let mut controller = ExecutionController::new(llm, executor, cfg.controller.clone())
        .context("Invalid controller configuration")?
        .with_context_turns(cfg.app.max_context_turns)
        .with_status_callback(callback);

    let record = controller.start(&task).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to serialize task record")?
    );
    Ok(())
}
