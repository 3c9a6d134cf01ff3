//! 图调度引擎
//!
//! 单线程协作式：一次只执行一个节点。每步读取一致的状态快照，得到 Step 后依次
//! 解析目标 -> 校验转移 -> 原子应用补丁 -> 写检查点，然后才进入下一步。
//! 任一环节失败则该步不提交任何东西，最近的检查点（其 next 指向失败节点）即为恢复点。

use std::sync::Arc;

use crate::core::{AgentError, ConversationState, StatePatch, GLOBAL_CHANNEL};
use crate::graph::{AgentGraph, NodeId};
use crate::llm::DecisionOracle;
use crate::memory::{Checkpoint, Checkpointer, Message, Role};

const USER_REPLY_MARKER: &str = "response_to_user: ";

/// 一个回合（或一次恢复）的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub state: ConversationState,
    /// 本次执行的步数
    pub steps: usize,
    pub visited: Vec<NodeId>,
    /// 回合结束时给用户的最终回复
    pub reply: Option<String>,
}

pub struct GraphEngine {
    graph: Arc<AgentGraph>,
    oracle: Arc<dyn DecisionOracle>,
    checkpointer: Arc<dyn Checkpointer>,
    max_steps: usize,
    keep_last: usize,
    merchant_profile: Option<String>,
}

impl GraphEngine {
    pub fn new(
        graph: Arc<AgentGraph>,
        oracle: Arc<dyn DecisionOracle>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            graph,
            oracle,
            checkpointer,
            max_steps: 25,
            keep_last: 0,
            merchant_profile: None,
        }
    }

    /// 单次执行的最大步数
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// 每个会话保留的检查点数，0 表示不清理
    pub fn keep_last(mut self, keep: usize) -> Self {
        self.keep_last = keep;
        self
    }

    pub fn merchant_profile(mut self, profile: impl Into<String>) -> Self {
        self.merchant_profile = Some(profile.into());
        self
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    fn fresh_state(&self) -> ConversationState {
        let mut state = self.graph.initial_state();
        if let Some(profile) = &self.merchant_profile {
            state.merchant_profile = profile.clone();
        }
        state
    }

    /// 检查点可能由通道更少的旧图写入
    fn adopt(&self, session_id: &str, mut state: ConversationState) -> ConversationState {
        let added = state.ensure_channels(self.graph.channels().iter().cloned());
        if added > 0 {
            tracing::info!(session = %session_id, added, "added channels missing from checkpoint");
        }
        state
    }

    /// 追加用户消息并从入口开始执行一个回合
    pub async fn run_turn(&self, session_id: &str, user_text: &str) -> Result<TurnOutcome, AgentError> {
        let (mut state, mut seq) = match self.checkpointer.load_latest(session_id).await? {
            Some(cp) => {
                if let Some(pending) = &cp.next {
                    tracing::warn!(session = %session_id, pending = %pending, "discarding unfinished turn");
                }
                (self.adopt(session_id, cp.state), cp.step)
            }
            None => (self.fresh_state(), 0),
        };

        state.apply(StatePatch::new().append(GLOBAL_CHANNEL, Message::user(user_text)))?;
        seq += 1;
        let entry = self.graph.entry().to_string();
        self.checkpointer
            .save(&Checkpoint::new(session_id, seq, state.clone(), Some(entry.clone())))
            .await?;

        tracing::info!(session = %session_id, entry = %entry, "turn started");
        self.drive(session_id, state, seq, entry).await
    }

    /// 从最近的检查点继续（不追加新输入）
    pub async fn resume(&self, session_id: &str) -> Result<TurnOutcome, AgentError> {
        let cp = self
            .checkpointer
            .load_latest(session_id)
            .await?
            .ok_or_else(|| AgentError::NoCheckpoint(session_id.to_string()))?;
        self.replay(cp).await
    }

    /// 从任意检查点继续执行；检查点已是回合终点时直接返回
    pub async fn replay(&self, checkpoint: Checkpoint) -> Result<TurnOutcome, AgentError> {
        let Checkpoint {
            session_id,
            step,
            state,
            next,
            ..
        } = checkpoint;
        match next {
            Some(node) => {
                tracing::info!(session = %session_id, node = %node, "resuming");
                let state = self.adopt(&session_id, state);
                self.drive(&session_id, state, step, node).await
            }
            None => Ok(TurnOutcome {
                reply: final_reply(&state),
                session_id,
                state,
                steps: 0,
                visited: Vec::new(),
            }),
        }
    }

    /// 当前会话的用户可见对话记录
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        Ok(self
            .checkpointer
            .load_latest(session_id)
            .await?
            .map(|cp| cp.state.channel(GLOBAL_CHANNEL).to_vec())
            .unwrap_or_default())
    }

    async fn drive(
        &self,
        session_id: &str,
        mut state: ConversationState,
        mut seq: u64,
        start: NodeId,
    ) -> Result<TurnOutcome, AgentError> {
        let mut current = Some(start);
        let mut visited = Vec::new();

        while let Some(id) = current {
            if visited.len() >= self.max_steps {
                return Err(AgentError::StepLimitExceeded(self.max_steps));
            }
            let step = self
                .graph
                .node(&id)?
                .step(&state, self.oracle.as_ref())
                .await?;
            let next = self.graph.resolve(&step.goto)?;
            if let Some(to) = &next {
                self.graph.check_transition(&id, to)?;
            }
            tracing::debug!(node = %id, patch = ?step.patch.ops(), next = ?next, "step");

            let mut committed = state.clone();
            committed.apply(step.patch)?;
            seq += 1;
            self.checkpointer
                .save(&Checkpoint::new(session_id, seq, committed.clone(), next.clone()))
                .await?;

            tracing::info!(session = %session_id, from = %id, to = next.as_deref().unwrap_or("END"), "transfer");
            state = committed;
            visited.push(id);
            current = next;
        }

        if self.keep_last > 0 {
            let pruned = self.checkpointer.prune(session_id, self.keep_last).await?;
            if pruned > 0 {
                tracing::debug!(session = %session_id, pruned, "checkpoints pruned");
            }
        }

        let reply = final_reply(&state);
        tracing::info!(session = %session_id, steps = visited.len(), replied = reply.is_some(), "turn finished");
        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            state,
            steps: visited.len(),
            visited,
            reply,
        })
    }
}

/// 全局通道最后一条 assistant 消息中的用户回复部分
pub fn final_reply(state: &ConversationState) -> Option<String> {
    state
        .last_message(GLOBAL_CHANNEL)
        .filter(|m| m.role == Role::Assistant)
        .and_then(|m| {
            m.content
                .find(USER_REPLY_MARKER)
                .map(|i| m.content[i + USER_REPLY_MARKER.len()..].to_string())
        })
}
