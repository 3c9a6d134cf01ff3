//! Agent 错误类型
//!
//! 三类错误：配置错误（构图时致命）、路由错误（回合内致命，不重试）、外部调用错误（Oracle / 检索 / 工具 / 检查点，原样上抛）。
//! 任一错误都会中止当前回合，且不提交该步的状态补丁与检查点。

use thiserror::Error;

/// Agent 运行与构图过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Planner 委派给了不存在的同事 Agent
    #[error("Unknown co-worker '{worker}' for planner '{planner}'")]
    UnknownWorker { planner: String, worker: String },

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// Oracle 返回了当前 Agent 不允许的决策形态
    #[error("Decision '{shape}' not allowed for {agent}")]
    DisallowedDecision { agent: String, shape: String },

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("No orchestrator to return to from {0}")]
    NoOrchestrator(String),

    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("No checkpoint for session {0}")]
    NoCheckpoint(String),
}

impl AgentError {
    /// 回合内的路由错误：决策形态、委派目标或控制转移不合法
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            AgentError::UnknownWorker { .. }
                | AgentError::UnknownRoute(_)
                | AgentError::DisallowedDecision { .. }
                | AgentError::InvalidDecision(_)
                | AgentError::NoOrchestrator(_)
                | AgentError::IllegalTransition { .. }
                | AgentError::HallucinatedTool(_)
        )
    }

    /// 构图阶段的配置错误
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            AgentError::ConfigError(_) | AgentError::DuplicateChannel(_)
        )
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::JsonParseError(e.to_string())
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::CheckpointError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let routing = AgentError::UnknownWorker {
            planner: "Billing_agent".into(),
            worker: "nonexistent_agent".into(),
        };
        assert!(routing.is_routing());
        assert!(!routing.is_config());
        assert!(routing.to_string().contains("nonexistent_agent"));

        assert!(AgentError::DuplicateChannel("messages".into()).is_config());
        assert!(!AgentError::LlmError("down".into()).is_routing());
    }
}
