//! 工具层：注册表、执行器、指令协议与一次性能力选择

pub mod echo;
pub mod executor;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod selector;

pub use echo::EchoTool;
pub use executor::{ToolExecutor, ToolOutcome};
pub use protocol::{
    format_directive, splice, splice_all, Directive, DirectiveParser, MarkerDirectiveParser,
    ProcessedResponse, ResolvedCall, ToolProtocol, DIRECTIVE_CLOSE, DIRECTIVE_OPEN,
};
pub use registry::{Tool, ToolFn, ToolHandler, ToolRegistry, ToolSpec};
pub use schema::selection_schema_json;
pub use selector::{ToolSelection, ToolSelector};
