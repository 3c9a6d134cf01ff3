//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(call) 在超时内调用 registry.execute，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::{ToolRegistry, ToolSpec};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次工具调用；未绑定的工具返回 HallucinatedTool
    pub async fn execute(&self, call: &ToolCall) -> Result<String, AgentError> {
        if !self.registry.contains(&call.tool) {
            return Err(AgentError::HallucinatedTool(call.tool.clone()));
        }

        let start = Instant::now();
        let args_preview = args_preview(&call.args);
        let result = timeout(
            self.timeout,
            self.registry.execute(&call.tool, call.args.clone()),
        )
        .await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(format!("{}: {}", call.tool, e))),
            Err(_) => Err(AgentError::ToolTimeout(call.tool.clone())),
        }
    }

    /// 绑定工具的描述，按名称排序
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry
            .tool_names()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .map(|tool| ToolSpec::of(tool.as_ref()))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
