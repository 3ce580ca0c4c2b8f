//! 核心层：错误类型、运行状态、停滞监视、阶段提示与执行控制器

pub mod controller;
pub mod error;
pub mod events;
pub mod prompts;
pub mod recovery;
pub mod state;

pub use controller::{ControllerConfig, ExecutionController};
pub use error::AgentError;
pub use events::{StatusCallback, StatusUpdate};
pub use recovery::{ProgressMonitor, StallVerdict};
pub use state::{HistoryEntry, HistoryKind, IterationOutcome, TaskPhase, TaskRecord};
