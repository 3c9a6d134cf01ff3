//! 记忆 Agent：decide -> (fetch) -> flush 三段流水线
//!
//! - decide：以最新用户消息与 latest_memory 渲染提示词，Oracle 绑定知识库工具，回复（工具调用请求或直接回答）写入记忆通道
//! - fetch：执行请求的检索工具，追加工具结果
//! - flush：最后一条是工具结果则成为新的 latest_memory；无论如何清空记忆通道，并把 last_message_from 设为 memory_agent
//!
//! 三段分别是图中的三个节点：`{name}`、`{name}:fetch`、`{name}:flush`。

use crate::agents::prompts::render;
use crate::agents::AgentConfig;
use crate::core::{AgentError, ConversationState, StatePatch, MEMORY_AGENT_SPEAKER};
use crate::graph::{Goto, NodeId, Step};
use crate::llm::{decide_checked, Decision, DecisionOracle, DecisionRequest, DecisionShape};
use crate::memory::Message;
use crate::tools::{ToolExecutor, ToolRegistry};

pub const NO_KNOWLEDGE_YET: &str = "No knowledge retrieved yet";

/// 记忆流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStage {
    Decide,
    Fetch,
    Flush,
}

impl MemoryStage {
    pub fn node_id(&self, memory_name: &str) -> NodeId {
        match self {
            MemoryStage::Decide => memory_name.to_string(),
            MemoryStage::Fetch => format!("{}:fetch", memory_name),
            MemoryStage::Flush => format!("{}:flush", memory_name),
        }
    }
}

pub struct MemoryAgent {
    config: AgentConfig,
    tools: ToolExecutor,
}

impl MemoryAgent {
    pub fn new(config: AgentConfig, tool_timeout_secs: u64) -> Self {
        let tools = ToolExecutor::new(ToolRegistry::from_tools(&config.tools), tool_timeout_secs);
        Self { config, tools }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    /// 流水线结束后交还控制的 Planner
    pub fn planner(&self) -> &str {
        &self.config.parent_name
    }

    pub fn stage_node(&self, stage: MemoryStage) -> NodeId {
        stage.node_id(&self.config.name)
    }

    pub async fn step(
        &self,
        stage: MemoryStage,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        match stage {
            MemoryStage::Decide => self.decide(state, oracle).await,
            MemoryStage::Fetch => self.fetch(state).await,
            MemoryStage::Flush => Ok(self.flush(state)),
        }
    }

    async fn decide(
        &self,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        let user_message = state
            .latest_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let latest_memory = if state.latest_memory.is_empty() {
            NO_KNOWLEDGE_YET
        } else {
            state.latest_memory.as_str()
        };
        let prompt = render(
            &self.config.system_prompt,
            &[("user_message", user_message), ("latest_memory", latest_memory)],
        );

        let request = DecisionRequest::new(self.config.name.clone(), vec![Message::system(prompt)])
            .allow(&[DecisionShape::CallTools, DecisionShape::Answer])
            .with_tools(self.tools.specs());

        let reply = match decide_checked(oracle, &request).await? {
            Decision::CallTools { calls } => Message::assistant("").with_tool_calls(calls),
            Decision::Answer { content } => Message::assistant(content),
            other => {
                return Err(AgentError::InvalidDecision(format!(
                    "{} returned {}",
                    self.config.name,
                    other.shape().as_str()
                )))
            }
        };
        let next = if reply.is_tool_call_request() {
            MemoryStage::Fetch
        } else {
            MemoryStage::Flush
        };
        tracing::debug!(agent = %self.config.name, next = ?next, "memory decide");

        let patch = StatePatch::new().append(self.config.channel.clone(), reply.with_name(self.config.name.clone()));
        Ok(Step::new(patch, Goto::Node(self.stage_node(next))))
    }

    async fn fetch(&self, state: &ConversationState) -> Result<Step, AgentError> {
        let calls = state
            .last_message(&self.config.channel)
            .filter(|m| m.is_tool_call_request())
            .map(|m| m.tool_calls.clone())
            .ok_or_else(|| {
                AgentError::InvalidDecision(format!(
                    "{} has no pending retrieval request",
                    self.config.name
                ))
            })?;

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let output = self.tools.execute(call).await?;
            results.push(Message::tool(output, call.id.clone()).with_name(call.tool.clone()));
        }
        tracing::info!(agent = %self.config.name, calls = calls.len(), "knowledge fetched");

        let patch = StatePatch::new().append_all(self.config.channel.clone(), results);
        Ok(Step::new(patch, Goto::Node(self.stage_node(MemoryStage::Flush))))
    }

    fn flush(&self, state: &ConversationState) -> Step {
        let mut patch = StatePatch::new();
        if let Some(last) = state
            .last_message(&self.config.channel)
            .filter(|m| m.is_tool_result())
        {
            patch = patch.latest_memory(last.content.clone());
        }
        let patch = patch
            .clear(self.config.channel.clone())
            .last_message_from(MEMORY_AGENT_SPEAKER);
        Step::new(patch, Goto::Node(self.config.parent_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{build_topic_config, HistoryPolicy, PromptSet, Topic};
    use crate::core::GLOBAL_CHANNEL;
    use crate::llm::ScriptedOracle;
    use crate::memory::ToolCall;
    use crate::tools::FnTool;

    fn memory_agent() -> MemoryAgent {
        let topic = Topic::new("Billing")
            .read_tool(FnTool::canned("get_refund_source", "Returns the refund source.", "card"))
            .knowledge_tool(FnTool::canned(
                "past_successful_example",
                "Past tickets.",
                "refund policy: full refund within 7 days",
            ));
        let planner = build_topic_config(&topic, &PromptSet::default(), HistoryPolicy::All).unwrap();
        MemoryAgent::new(*planner.memory.unwrap(), 5)
    }

    fn state_with_user(agent: &MemoryAgent, text: &str) -> ConversationState {
        let mut state = ConversationState::with_channels([agent.channel().to_string()]);
        state
            .apply(StatePatch::new().append(GLOBAL_CHANNEL, Message::user(text)))
            .unwrap();
        state
    }

    fn fetch_call() -> Decision {
        Decision::CallTools {
            calls: vec![ToolCall {
                id: String::new(),
                tool: "past_successful_example".into(),
                args: serde_json::json!({"query": "charged twice"}),
            }],
        }
    }

    #[test]
    fn test_stage_node_ids() {
        assert_eq!(MemoryStage::Decide.node_id("Billing_memory_agent"), "Billing_memory_agent");
        assert_eq!(MemoryStage::Fetch.node_id("Billing_memory_agent"), "Billing_memory_agent:fetch");
        assert_eq!(MemoryStage::Flush.node_id("Billing_memory_agent"), "Billing_memory_agent:flush");
    }

    #[tokio::test]
    async fn test_decide_prompt_uses_sentinel_and_user_message() {
        let agent = memory_agent();
        let state = state_with_user(&agent, "I was charged twice");
        let oracle = ScriptedOracle::new(vec![fetch_call()]);

        let step = agent.step(MemoryStage::Decide, &state, &oracle).await.unwrap();
        assert_eq!(step.goto, Goto::Node("Billing_memory_agent:fetch".into()));

        let prompt = &oracle.requests().await[0].messages[0].content;
        assert!(prompt.contains("I was charged twice"));
        assert!(prompt.contains(NO_KNOWLEDGE_YET));
    }

    #[tokio::test]
    async fn test_decide_answer_goes_straight_to_flush() {
        let agent = memory_agent();
        let mut state = state_with_user(&agent, "thanks");
        state.apply(StatePatch::new().latest_memory("known policy")).unwrap();
        let oracle = ScriptedOracle::new(vec![Decision::Answer { content: "no retrieval needed".into() }]);

        let step = agent.step(MemoryStage::Decide, &state, &oracle).await.unwrap();
        assert_eq!(step.goto, Goto::Node("Billing_memory_agent:flush".into()));
        assert!(oracle.requests().await[0].messages[0].content.contains("known policy"));

        state.apply(step.patch).unwrap();
        let flush = agent.step(MemoryStage::Flush, &state, &oracle).await.unwrap();
        assert_eq!(flush.goto, Goto::Node("Billing_agent".into()));
        state.apply(flush.patch).unwrap();
        assert_eq!(state.latest_memory, "known policy");
        assert!(state.channel(agent.channel()).is_empty());
        assert!(state.last_from_memory());
    }

    #[tokio::test]
    async fn test_full_pipeline_replaces_latest_memory() {
        let agent = memory_agent();
        let mut state = state_with_user(&agent, "I was charged twice");
        let oracle = ScriptedOracle::new(vec![fetch_call()]);

        for stage in [MemoryStage::Decide, MemoryStage::Fetch, MemoryStage::Flush] {
            let step = agent.step(stage, &state, &oracle).await.unwrap();
            state.apply(step.patch).unwrap();
        }
        assert_eq!(state.latest_memory, "refund policy: full refund within 7 days");
        assert!(state.channel(agent.channel()).is_empty());
        assert_eq!(state.last_message_from.as_deref(), Some(MEMORY_AGENT_SPEAKER));
    }

    #[tokio::test]
    async fn test_fetch_without_request_is_error() {
        let agent = memory_agent();
        let state = state_with_user(&agent, "hello");
        let oracle = ScriptedOracle::new(vec![]);
        assert!(agent.step(MemoryStage::Fetch, &state, &oracle).await.is_err());
    }
}
