//! Planner Agent：每步在 Delegate / RespondToUser / ReturnToParent 中三选一
//!
//! 系统提示词 = 模板（代入 latest_memory、merchant_profile）+ 同事能力说明，其后是全局通道历史。
//! 没有上级 orchestrator 时不允许 ReturnToParent。

use crate::agents::prompts::render;
use crate::agents::AgentConfig;
use crate::core::{AgentError, ConversationState, StatePatch, GLOBAL_CHANNEL};
use crate::graph::{Goto, Step};
use crate::llm::{decide_checked, Decision, DecisionOracle, DecisionRequest, DecisionShape};
use crate::memory::Message;

pub struct PlannerAgent {
    config: AgentConfig,
    orchestrator: Option<String>,
}

impl PlannerAgent {
    /// orchestrator 为 None 时按独立 Planner 运行
    pub fn new(config: AgentConfig, orchestrator: Option<String>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.config.co_worker_names()
    }

    pub fn orchestrator(&self) -> Option<&str> {
        self.orchestrator.as_deref()
    }

    pub fn allowed_shapes(&self) -> &'static [DecisionShape] {
        if self.orchestrator.is_some() {
            &[
                DecisionShape::Delegate,
                DecisionShape::RespondToUser,
                DecisionShape::ReturnToParent,
            ]
        } else {
            &[DecisionShape::Delegate, DecisionShape::RespondToUser]
        }
    }

    pub async fn step(
        &self,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        let prompt = render(
            &self.config.system_prompt,
            &[
                ("latest_memory", state.latest_memory.as_str()),
                ("merchant_profile", state.merchant_profile.as_str()),
            ],
        );
        let mut messages = vec![Message::system(prompt)];
        messages.extend(self.config.history.select(state.channel(&self.config.channel)));

        let request = DecisionRequest::new(self.config.name.clone(), messages)
            .allow(self.allowed_shapes());

        match decide_checked(oracle, &request).await? {
            Decision::RespondToUser { thought, response } => {
                let reply = self.say(format!("Thought: {}\nresponse_to_user: {}", thought, response));
                tracing::info!(agent = %self.config.name, "responding to user");
                let patch = StatePatch::new()
                    .append(GLOBAL_CHANNEL, reply)
                    .last_message_from(self.config.name.clone());
                Ok(Step::new(patch, Goto::End))
            }
            Decision::Delegate {
                thought,
                co_worker_name,
                co_worker_task,
                intermediate_response,
            } => self.delegate(state, thought, co_worker_name, co_worker_task, intermediate_response),
            Decision::ReturnToParent {
                return_message, ..
            } => {
                let orchestrator = self
                    .orchestrator
                    .clone()
                    .ok_or_else(|| AgentError::NoOrchestrator(self.config.name.clone()))?;
                tracing::info!(agent = %self.config.name, reason = %return_message, "returning to orchestrator");
                Ok(Step::goto(Goto::Node(orchestrator)))
            }
            other => Err(AgentError::DisallowedDecision {
                agent: self.config.name.clone(),
                shape: other.shape().as_str().to_string(),
            }),
        }
    }

    fn delegate(
        &self,
        state: &ConversationState,
        thought: String,
        worker: String,
        task: String,
        interim: String,
    ) -> Result<Step, AgentError> {
        let target = self
            .config
            .co_workers
            .iter()
            .find(|c| c.name == worker)
            .ok_or_else(|| AgentError::UnknownWorker {
                planner: self.config.name.clone(),
                worker: worker.clone(),
            })?;

        let rationale = self.say(format!(
            "Thought: {}\ncoworker_name: {}\ncoworker_task:{}",
            thought, worker, task
        ));

        let mut patch = StatePatch::new()
            .append(target.channel.clone(), rationale.clone())
            .last_message_from(self.config.name.clone());
        // 只在记忆阶段刚结束后向用户致意一次
        if state.last_from_memory() {
            patch = patch.append_all(
                GLOBAL_CHANNEL,
                vec![rationale, self.say(format!("response_to_user: {}", interim))],
            );
        }
        tracing::info!(agent = %self.config.name, worker = %worker, "delegating");
        Ok(Step::new(patch, Goto::Node(target.name.clone())))
    }

    fn say(&self, content: String) -> Message {
        Message::assistant(content).with_name(self.config.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{build_topic_config, HistoryPolicy, PromptSet, Topic};
    use crate::core::MEMORY_AGENT_SPEAKER;
    use crate::llm::ScriptedOracle;
    use crate::tools::FnTool;

    fn planner(orchestrator: Option<&str>) -> PlannerAgent {
        let topic = Topic::new("Billing")
            .read_tool(FnTool::canned("get_refund_source", "Returns the refund source.", "card"))
            .update_tool(FnTool::canned("update_refund_source", "Changes the refund source.", "ok"))
            .knowledge_tool(FnTool::canned("past_successful_example", "Past tickets.", "none"));
        let cfg = build_topic_config(&topic, &PromptSet::default(), HistoryPolicy::All).unwrap();
        PlannerAgent::new(cfg, orchestrator.map(String::from))
    }

    fn state(after_memory: bool) -> ConversationState {
        let mut s = ConversationState::with_channels([
            "Billing_read_agent_messages",
            "Billing_update_agent_messages",
            "Billing_memory_agent_messages",
        ]);
        let mut patch = StatePatch::new()
            .append(GLOBAL_CHANNEL, Message::user("I was charged twice"))
            .latest_memory("refund within 7 days");
        patch = if after_memory {
            patch.last_message_from(MEMORY_AGENT_SPEAKER)
        } else {
            patch.last_message_from("Billing_read_agent")
        };
        s.apply(patch).unwrap();
        s
    }

    fn delegate(worker: &str) -> Decision {
        Decision::Delegate {
            thought: "need the refund source".into(),
            co_worker_name: worker.into(),
            co_worker_task: "look up refund source".into(),
            intermediate_response: "let me check, please hold on".into(),
        }
    }

    #[tokio::test]
    async fn test_respond_to_user_ends_turn() {
        let p = planner(Some("orchestrator_agent"));
        let mut s = state(true);
        let oracle = ScriptedOracle::new(vec![Decision::RespondToUser {
            thought: "known".into(),
            response: "Refund issued".into(),
        }]);
        let step = p.step(&s, &oracle).await.unwrap();
        assert_eq!(step.goto, Goto::End);
        s.apply(step.patch).unwrap();
        assert_eq!(
            s.last_message(GLOBAL_CHANNEL).unwrap().content,
            "Thought: known\nresponse_to_user: Refund issued"
        );
        assert_eq!(s.last_message_from.as_deref(), Some("Billing_agent"));

        let prompt = &oracle.requests().await[0].messages[0].content;
        assert!(prompt.contains("refund within 7 days"));
        assert!(prompt.contains("Ability 1: Returns the refund source."));
    }

    #[tokio::test]
    async fn test_delegate_acknowledges_after_memory() {
        let p = planner(Some("orchestrator_agent"));
        let mut s = state(true);
        let before = s.channel(GLOBAL_CHANNEL).len();
        let oracle = ScriptedOracle::new(vec![delegate("Billing_read_agent")]);
        let step = p.step(&s, &oracle).await.unwrap();
        assert_eq!(step.goto, Goto::Node("Billing_read_agent".into()));
        s.apply(step.patch).unwrap();

        let task = s.last_message("Billing_read_agent_messages").unwrap();
        assert_eq!(
            task.content,
            "Thought: need the refund source\ncoworker_name: Billing_read_agent\ncoworker_task:look up refund source"
        );
        let global = s.channel(GLOBAL_CHANNEL);
        assert_eq!(global.len(), before + 2);
        assert_eq!(global[before + 1].content, "response_to_user: let me check, please hold on");
    }

    #[tokio::test]
    async fn test_delegate_without_memory_speaker_stays_silent() {
        let p = planner(Some("orchestrator_agent"));
        let mut s = state(false);
        let before = s.channel(GLOBAL_CHANNEL).to_vec();
        let oracle = ScriptedOracle::new(vec![delegate("Billing_update_agent")]);
        let step = p.step(&s, &oracle).await.unwrap();
        s.apply(step.patch).unwrap();
        assert_eq!(s.channel(GLOBAL_CHANNEL), before.as_slice());
        assert_eq!(s.channel("Billing_update_agent_messages").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_worker_is_routing_error() {
        let p = planner(Some("orchestrator_agent"));
        let oracle = ScriptedOracle::new(vec![delegate("nonexistent_agent")]);
        let err = p.step(&state(true), &oracle).await.unwrap_err();
        assert!(err.is_routing());
        assert!(matches!(err, AgentError::UnknownWorker { .. }));
    }

    #[tokio::test]
    async fn test_return_to_parent_only_with_orchestrator() {
        let give_back = Decision::ReturnToParent {
            thought: "not billing".into(),
            return_message: "we do not handle account access".into(),
        };

        let p = planner(Some("orchestrator_agent"));
        let oracle = ScriptedOracle::new(vec![give_back.clone()]);
        let step = p.step(&state(true), &oracle).await.unwrap();
        assert_eq!(step.goto, Goto::Node("orchestrator_agent".into()));
        assert!(step.patch.is_empty());

        let standalone = planner(None);
        assert_eq!(standalone.allowed_shapes().len(), 2);
        let oracle = ScriptedOracle::new(vec![give_back]);
        let err = standalone.step(&state(true), &oracle).await.unwrap_err();
        assert!(matches!(err, AgentError::DisallowedDecision { .. }));
    }
}
