//! Agent 层：配置树、提示词模板与四类 Agent 的单步逻辑
//!
//! 每个 Agent 只读取一份状态快照，返回 Step（补丁 + 转移目标），由 graph::GraphEngine 统一应用。

pub mod config;
pub mod executor;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod prompts;

pub use config::{
    build_agent_config, build_topic_config, AgentConfig, AgentKind, HistoryPolicy, Topic,
    ORCHESTRATOR_NAME,
};
pub use executor::ExecutorAgent;
pub use memory::{MemoryAgent, MemoryStage, NO_KNOWLEDGE_YET};
pub use orchestrator::OrchestratorAgent;
pub use planner::PlannerAgent;
pub use prompts::{render, PromptSet};
