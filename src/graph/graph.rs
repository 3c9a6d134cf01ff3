//! 组合后的 Agent 图
//!
//! 节点表 + 合法转移边 + Topic -> 子图入口映射 + 构图时固定的通道集合。
//! 调度器每步前都用 check_transition 校验 Agent 返回的目标是否在拓扑内。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::agents::{ExecutorAgent, MemoryAgent, MemoryStage, OrchestratorAgent, PlannerAgent};
use crate::core::{AgentError, ConversationState};
use crate::graph::{Goto, NodeId, Step};
use crate::llm::DecisionOracle;

/// 图节点：记忆 Agent 的三个阶段共享同一个 Agent 实例
pub enum AgentNode {
    Orchestrator(OrchestratorAgent),
    Planner(PlannerAgent),
    Executor(ExecutorAgent),
    Memory {
        agent: Arc<MemoryAgent>,
        stage: MemoryStage,
    },
}

impl AgentNode {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentNode::Orchestrator(_) => "orchestrator",
            AgentNode::Planner(_) => "planner",
            AgentNode::Executor(_) => "executor",
            AgentNode::Memory { .. } => "memory",
        }
    }

    pub async fn step(
        &self,
        state: &ConversationState,
        oracle: &dyn DecisionOracle,
    ) -> Result<Step, AgentError> {
        match self {
            AgentNode::Orchestrator(agent) => agent.step(state, oracle).await,
            AgentNode::Planner(agent) => agent.step(state, oracle).await,
            AgentNode::Executor(agent) => agent.step(state, oracle).await,
            AgentNode::Memory { agent, stage } => agent.step(*stage, state, oracle).await,
        }
    }
}

pub struct AgentGraph {
    pub(crate) nodes: BTreeMap<NodeId, AgentNode>,
    pub(crate) edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Topic 名 -> 子图入口（该 Topic 的记忆 Agent）
    pub(crate) subgraphs: BTreeMap<String, NodeId>,
    pub(crate) entry: NodeId,
    pub(crate) channels: Vec<String>,
}

impl AgentGraph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, id: &str) -> Result<&AgentNode, AgentError> {
        self.nodes
            .get(id)
            .ok_or_else(|| AgentError::UnknownNode(id.to_string()))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// 构图时创建的全部 Agent 通道（不含全局通道）
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.subgraphs.keys().map(String::as_str)
    }

    /// 把转移目标解析为具体节点；End 返回 None
    pub fn resolve(&self, goto: &Goto) -> Result<Option<NodeId>, AgentError> {
        match goto {
            Goto::End => Ok(None),
            Goto::Node(id) if self.contains(id) => Ok(Some(id.clone())),
            Goto::Node(id) => Err(AgentError::UnknownNode(id.clone())),
            Goto::Subgraph(topic) => self
                .subgraphs
                .get(topic)
                .cloned()
                .map(Some)
                .ok_or_else(|| AgentError::UnknownRoute(topic.clone())),
        }
    }

    pub fn check_transition(&self, from: &str, to: &str) -> Result<(), AgentError> {
        if self.edges.get(from).is_some_and(|targets| targets.contains(to)) {
            Ok(())
        } else {
            Err(AgentError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// 新会话的初始状态：每个通道为空
    pub fn initial_state(&self) -> ConversationState {
        ConversationState::with_channels(self.channels.iter().cloned())
    }

    /// 文本形式的拓扑：入口、节点（含类型）、边
    pub fn describe(&self) -> String {
        let mut out = format!("entry -> {}\n", self.entry);
        for (id, node) in &self.nodes {
            out.push_str(&format!("node {} [{}]\n", id, node.kind()));
        }
        for (from, targets) in &self.edges {
            for to in targets {
                out.push_str(&format!("{} -> {}\n", from, to));
            }
        }
        out
    }
}
