//! 决策 Oracle：一次调用返回且仅返回一个结构化决策
//!
//! Decision 是以 "kind" 为判别字段的标签联合；每个 Agent 在 DecisionRequest 中声明本次允许的形态（allow-list），
//! decide_checked 统一校验：形态不在名单内、路由不在候选集合、请求了未绑定的工具，均为路由错误。
//! LlmOracle 基于任意 LlmClient：注入 Schema 说明，解析回复中的 JSON。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCall};
use crate::tools::{decision_instructions, ToolSpec};

/// 决策形态（判别字段取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionShape {
    Delegate,
    RespondToUser,
    ReturnToParent,
    Route,
    CallTools,
    Answer,
}

impl DecisionShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionShape::Delegate => "delegate",
            DecisionShape::RespondToUser => "respond_to_user",
            DecisionShape::ReturnToParent => "return_to_parent",
            DecisionShape::Route => "route",
            DecisionShape::CallTools => "call_tools",
            DecisionShape::Answer => "answer",
        }
    }
}

/// Oracle 的结构化决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Delegate the current task to a co-worker.
    Delegate {
        /// Reason for this step.
        thought: String,
        /// Co-worker name to delegate to.
        co_worker_name: String,
        /// Description and details of the task the co-worker has to execute. Do not include the co-worker abilities.
        co_worker_task: String,
        /// Short, natural holding message for the user, e.g. "ok let me check, please hold on for a moment". Do not disclose internal workings.
        intermediate_response: String,
    },
    /// Respond to the user.
    RespondToUser {
        /// Reason for this step.
        thought: String,
        /// Response to send to the user.
        response: String,
    },
    /// Return to the orchestrator when the request does not belong to this department.
    ReturnToParent {
        /// Reason for this step.
        thought: String,
        /// Why this department does not handle the query.
        return_message: String,
    },
    /// Pick the topic that should handle the conversation.
    Route {
        /// Reason for this step.
        thought: String,
        /// Topic name, one of the listed routes.
        route: String,
    },
    /// Call one or more of the available tools.
    CallTools { calls: Vec<ToolCall> },
    /// Final answer without calling tools.
    Answer { content: String },
}

impl Decision {
    pub fn shape(&self) -> DecisionShape {
        match self {
            Decision::Delegate { .. } => DecisionShape::Delegate,
            Decision::RespondToUser { .. } => DecisionShape::RespondToUser,
            Decision::ReturnToParent { .. } => DecisionShape::ReturnToParent,
            Decision::Route { .. } => DecisionShape::Route,
            Decision::CallTools { .. } => DecisionShape::CallTools,
            Decision::Answer { .. } => DecisionShape::Answer,
        }
    }
}

/// 一次决策请求：消息、允许的形态、可用工具、候选路由
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    /// 发起请求的 Agent 名（日志与错误信息用）
    pub agent: String,
    pub messages: Vec<Message>,
    pub allowed: Vec<DecisionShape>,
    pub tools: Vec<ToolSpec>,
    pub routes: Vec<String>,
}

impl DecisionRequest {
    pub fn new(agent: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            agent: agent.into(),
            messages,
            allowed: Vec::new(),
            tools: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn allow(mut self, shapes: &[DecisionShape]) -> Self {
        self.allowed = shapes.to_vec();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_routes(mut self, routes: Vec<String>) -> Self {
        self.routes = routes;
        self
    }

    pub fn allows(&self, shape: DecisionShape) -> bool {
        self.allowed.contains(&shape)
    }

    /// 校验决策是否落在本次请求允许的范围内
    pub fn validate(&self, decision: &Decision) -> Result<(), AgentError> {
        let shape = decision.shape();
        if !self.allows(shape) {
            return Err(AgentError::DisallowedDecision {
                agent: self.agent.clone(),
                shape: shape.as_str().to_string(),
            });
        }
        match decision {
            Decision::Route { route, .. } if !self.routes.contains(route) => {
                Err(AgentError::UnknownRoute(route.clone()))
            }
            Decision::CallTools { calls } => {
                if calls.is_empty() {
                    return Err(AgentError::InvalidDecision(format!(
                        "{} requested call_tools with no calls",
                        self.agent
                    )));
                }
                match calls
                    .iter()
                    .find(|c| !self.tools.iter().any(|t| t.name == c.tool))
                {
                    Some(c) => Err(AgentError::HallucinatedTool(c.tool.clone())),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

/// 决策 Oracle trait：同步往返（无流式），返回恰好一个决策
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, AgentError>;
}

/// 调用 Oracle 并校验；为缺失 ID 的工具调用补上确定性的 ID（call_0, call_1, ...）
pub async fn decide_checked(
    oracle: &dyn DecisionOracle,
    request: &DecisionRequest,
) -> Result<Decision, AgentError> {
    let mut decision = oracle.decide(request).await?;
    request.validate(&decision)?;
    if let Decision::CallTools { calls } = &mut decision {
        for (i, call) in calls.iter_mut().enumerate() {
            if call.id.is_empty() {
                call.id = format!("call_{i}");
            }
        }
    }
    tracing::debug!(agent = %request.agent, kind = decision.shape().as_str(), "decision");
    Ok(decision)
}

/// 从 LLM 输出中提取 JSON 并解析为 Decision（支持 ```json 代码块或裸 JSON）
pub fn parse_decision(output: &str) -> Result<Decision, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(json) = trimmed
        .find('{')
        .zip(trimmed.rfind('}'))
        .and_then(|(start, end)| trimmed.get(start..=end))
    {
        json
    } else {
        return Err(AgentError::JsonParseError(format!(
            "no JSON decision in output: {}",
            trimmed
        )));
    };

    serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))
}

/// 基于 LLM 的 Oracle：在消息末尾追加格式说明，调用 LLM 并解析
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    timeout: Option<Duration>,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, timeout: None }
    }

    /// 单次 LLM 请求超时（秒），0 表示不限
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, AgentError> {
        let mut messages = request.messages.clone();
        messages.push(Message::system(decision_instructions(request)));
        let call = self.llm.complete(&messages);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AgentError::LlmError(format!("{} timed out after {:?}", request.agent, limit)))?,
            None => call.await,
        }
        .map_err(AgentError::LlmError)?;
        parse_decision(&output)
    }
}
