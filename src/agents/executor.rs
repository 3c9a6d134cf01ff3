//! 执行 Agent（read / update）
//!
//! 读取自身通道（按历史策略），在绑定的工具集上运行「决策 -> 调用工具 -> 观察」循环直到给出答案，
//! 把答案写回自身通道并镜像到全局通道，然后总是把控制交还给所属 Planner。执行 Agent 从不委派。

use crate::agents::AgentConfig;
use crate::core::{AgentError, ConversationState, StatePatch, GLOBAL_CHANNEL};
use crate::graph::{Goto, Step};
use crate::llm::{decide_checked, Decision, DecisionOracle, DecisionRequest, DecisionShape};
use crate::memory::Message;
use crate::tools::{ToolExecutor, ToolRegistry};

pub struct ExecutorAgent {
    config: AgentConfig,
    tools: ToolExecutor,
    max_rounds: usize,
}

impl ExecutorAgent {
    pub fn new(config: AgentConfig, tool_timeout_secs: u64, max_rounds: usize) -> Self {
        let tools = ToolExecutor::new(ToolRegistry::from_tools(&config.tools), tool_timeout_secs);
        Self {
            config,
            tools,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn parent(&self) -> &str {
        &self.config.parent_name
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    pub async fn step(
        &self,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        let mut messages = vec![Message::system(self.config.system_prompt.clone())];
        messages.extend(self.config.history.select(state.channel(&self.config.channel)));

        let answer = self.run_tool_loop(messages, oracle).await?;
        let reply = Message::assistant(format!("{} coworker reply: {}", self.config.name, answer))
            .with_name(self.config.name.clone());

        tracing::info!(agent = %self.config.name, parent = %self.config.parent_name, "co-worker replied");
        let patch = StatePatch::new()
            .append(self.config.channel.clone(), reply.clone())
            .append(GLOBAL_CHANNEL, reply)
            .last_message_from(self.config.name.clone());
        Ok(Step::new(patch, Goto::Node(self.config.parent_name.clone())))
    }

    /// 工具循环：最后一轮只允许直接回答
    async fn run_tool_loop(
        &self,
        mut messages: Vec<Message>,
        oracle: &dyn DecisionOracle,
    ) -> Result<String, AgentError> {
        for round in 0..self.max_rounds {
            let shapes: &[DecisionShape] = if round + 1 < self.max_rounds {
                &[DecisionShape::CallTools, DecisionShape::Answer]
            } else {
                &[DecisionShape::Answer]
            };
            let request = DecisionRequest::new(self.config.name.clone(), messages.clone())
                .allow(shapes)
                .with_tools(self.tools.specs());

            match decide_checked(oracle, &request).await? {
                Decision::Answer { content } => return Ok(content),
                Decision::CallTools { calls } => {
                    messages.push(Message::assistant("").with_tool_calls(calls.clone()));
                    for call in &calls {
                        let output = self.tools.execute(call).await?;
                        messages.push(Message::tool(output, call.id.clone()));
                    }
                }
                other => {
                    return Err(AgentError::InvalidDecision(format!(
                        "{} returned {}",
                        self.config.name,
                        other.shape().as_str()
                    )))
                }
            }
        }
        Err(AgentError::StepLimitExceeded(self.max_rounds))
    }
}
