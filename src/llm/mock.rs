//! Mock LLM 与 Mock Oracle（用于测试与本地演示，无需 API）
//!
//! - MockLlmClient：按顺序回放预置回复，用尽后回显最后一条 User 消息
//! - ScriptedOracle：按顺序返回预置决策，并记录每次请求（确定性桩）
//! - MockOracle：按允许的形态给出固定决策，用于无 API Key 时跑通整张图

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::AgentError;
use crate::llm::{Decision, DecisionOracle, DecisionRequest, DecisionShape, LlmClient};
use crate::memory::{Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// Mock 客户端：回放预置回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let next = self
            .replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        Ok(next.unwrap_or_else(|| {
            serde_json::json!({
                "kind": "answer",
                "content": format!("Echo from Mock: {}", last_user(messages)),
            })
            .to_string()
        }))
    }
}

/// 脚本化 Oracle：依次返回预置决策，脚本用尽时返回 LlmError
#[derive(Default)]
pub struct ScriptedOracle {
    script: AsyncMutex<VecDeque<Decision>>,
    requests: AsyncMutex<Vec<DecisionRequest>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Decision>) -> Self {
        Self {
            script: AsyncMutex::new(script.into()),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    /// 已收到的全部请求（按顺序）
    pub async fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, AgentError> {
        self.requests.lock().await.push(request.clone());
        self.script.lock().await.pop_front().ok_or_else(|| {
            AgentError::LlmError(format!("script exhausted at {}", request.agent))
        })
    }
}

/// 固定策略 Oracle：能直接回复就回复（回显用户输入），否则选第一个路由，否则直接回答
#[derive(Debug, Default)]
pub struct MockOracle;

#[async_trait]
impl DecisionOracle for MockOracle {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, AgentError> {
        let echo = format!("Echo from Mock: {}", last_user(&request.messages));
        if request.allows(DecisionShape::RespondToUser) {
            return Ok(Decision::RespondToUser {
                thought: "mock".to_string(),
                response: echo,
            });
        }
        if request.allows(DecisionShape::Route) {
            if let Some(route) = request.routes.first() {
                return Ok(Decision::Route {
                    thought: "mock".to_string(),
                    route: route.clone(),
                });
            }
        }
        if request.allows(DecisionShape::Answer) {
            return Ok(Decision::Answer { content: echo });
        }
        Err(AgentError::LlmError(format!(
            "mock oracle cannot satisfy {}",
            request.agent
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_llm_replays_then_echoes() {
        let llm = MockLlmClient::with_replies(vec!["first".into()]);
        let msgs = vec![Message::user("hello")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "first");
        assert!(llm.complete(&msgs).await.unwrap().contains("Echo from Mock: hello"));
    }

    #[tokio::test]
    async fn test_scripted_oracle_records_and_exhausts() {
        let oracle = ScriptedOracle::new(vec![Decision::Answer { content: "x".into() }]);
        let req = DecisionRequest::new("a", vec![]).allow(&[DecisionShape::Answer]);
        assert!(oracle.decide(&req).await.is_ok());
        assert!(matches!(oracle.decide(&req).await, Err(AgentError::LlmError(_))));
        assert_eq!(oracle.requests().await.len(), 2);
        assert_eq!(oracle.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_mock_oracle_picks_allowed_shape() {
        let req = DecisionRequest::new("orchestrator_agent", vec![Message::user("hi")])
            .allow(&[DecisionShape::Route])
            .with_routes(vec!["Accounts".into()]);
        assert_eq!(
            MockOracle.decide(&req).await.unwrap(),
            Decision::Route { thought: "mock".into(), route: "Accounts".into() }
        );

        let req = DecisionRequest::new("Billing_agent", vec![Message::user("hi")])
            .allow(&[DecisionShape::Delegate, DecisionShape::RespondToUser]);
        assert!(matches!(
            MockOracle.decide(&req).await.unwrap(),
            Decision::RespondToUser { ref response, .. } if response == "Echo from Mock: hi"
        ));
    }
}
