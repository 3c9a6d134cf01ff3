//! 由 AgentConfig 树构建 AgentGraph
//!
//! 每个 Topic 子图：记忆 Agent(decide -> fetch -> flush) -> Planner <-> 执行 Agent；
//! 顶层：Orchestrator -> 各子图入口，Planner 可交还给 Orchestrator。
//! 通道名必须全局唯一且不能占用全局通道名，违反即配置错误。

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::agents::{
    AgentConfig, AgentKind, ExecutorAgent, MemoryAgent, MemoryStage, OrchestratorAgent,
    PlannerAgent,
};
use crate::core::{AgentError, GLOBAL_CHANNEL};
use crate::graph::{AgentGraph, AgentNode, NodeId};

pub struct GraphBuilder {
    tool_timeout_secs: u64,
    max_tool_rounds: usize,
    nodes: BTreeMap<NodeId, AgentNode>,
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    subgraphs: BTreeMap<String, NodeId>,
    channels: Vec<String>,
    seen_channels: HashSet<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_tool_rounds: 6,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            subgraphs: BTreeMap::new(),
            channels: Vec::new(),
            seen_channels: HashSet::new(),
        }
    }

    pub fn tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// 完整图：入口为 orchestrator
    pub fn build(mut self, root: &AgentConfig) -> Result<AgentGraph, AgentError> {
        if root.kind != AgentKind::Orchestrator {
            return Err(AgentError::ConfigError(format!(
                "{} is not an orchestrator",
                root.name
            )));
        }
        if root.routes.is_empty() {
            return Err(AgentError::ConfigError("orchestrator has no routes".into()));
        }

        for route in &root.routes {
            if route.orchestrator.as_deref() != Some(root.name.as_str()) {
                return Err(AgentError::ConfigError(format!(
                    "{} is missing its orchestrator back-reference",
                    route.name
                )));
            }
            let memory_entry = self.add_topic(route, Some(root.name.clone()))?;
            self.edge(&root.name, &memory_entry);
            self.edge(&route.name, &root.name);
        }
        self.insert(
            root.name.clone(),
            AgentNode::Orchestrator(OrchestratorAgent::new(root.clone())),
        )?;
        Ok(self.finish(root.name.clone()))
    }

    /// 单个 Topic、无 orchestrator：入口为该 Topic 的记忆 Agent，Planner 不能交还
    pub fn build_standalone(mut self, planner: &AgentConfig) -> Result<AgentGraph, AgentError> {
        let entry = self.add_topic(planner, None)?;
        Ok(self.finish(entry))
    }

    fn add_topic(
        &mut self,
        planner: &AgentConfig,
        orchestrator: Option<String>,
    ) -> Result<NodeId, AgentError> {
        if planner.kind != AgentKind::Planner {
            return Err(AgentError::ConfigError(format!("{} is not a planner", planner.name)));
        }
        let memory_cfg = planner.memory.as_deref().ok_or_else(|| {
            AgentError::ConfigError(format!("{} has no memory agent", planner.name))
        })?;
        if planner.co_workers.is_empty() {
            return Err(AgentError::ConfigError(format!("{} has no co-workers", planner.name)));
        }

        for worker in &planner.co_workers {
            self.claim_channel(&worker.channel)?;
            self.insert(
                worker.name.clone(),
                AgentNode::Executor(ExecutorAgent::new(
                    worker.clone(),
                    self.tool_timeout_secs,
                    self.max_tool_rounds,
                )),
            )?;
            self.edge(&planner.name, &worker.name);
            self.edge(&worker.name, &planner.name);
        }

        self.claim_channel(&memory_cfg.channel)?;
        let memory = Arc::new(MemoryAgent::new(memory_cfg.clone(), self.tool_timeout_secs));
        let decide = memory.stage_node(MemoryStage::Decide);
        let fetch = memory.stage_node(MemoryStage::Fetch);
        let flush = memory.stage_node(MemoryStage::Flush);
        for stage in [MemoryStage::Decide, MemoryStage::Fetch, MemoryStage::Flush] {
            self.insert(
                memory.stage_node(stage),
                AgentNode::Memory {
                    agent: memory.clone(),
                    stage,
                },
            )?;
        }
        self.edge(&decide, &fetch);
        self.edge(&decide, &flush);
        self.edge(&fetch, &flush);
        self.edge(&flush, &planner.name);

        self.insert(
            planner.name.clone(),
            AgentNode::Planner(PlannerAgent::new(planner.clone(), orchestrator)),
        )?;
        self.subgraphs.insert(planner.topic.clone(), decide.clone());
        Ok(decide)
    }

    fn claim_channel(&mut self, channel: &str) -> Result<(), AgentError> {
        if channel == GLOBAL_CHANNEL || !self.seen_channels.insert(channel.to_string()) {
            return Err(AgentError::DuplicateChannel(channel.to_string()));
        }
        self.channels.push(channel.to_string());
        Ok(())
    }

    fn insert(&mut self, id: NodeId, node: AgentNode) -> Result<(), AgentError> {
        if self.nodes.contains_key(&id) {
            return Err(AgentError::ConfigError(format!("duplicate node {}", id)));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    fn edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    fn finish(self, entry: NodeId) -> AgentGraph {
        tracing::info!(
            entry = %entry,
            nodes = self.nodes.len(),
            channels = self.channels.len(),
            "agent graph built"
        );
        AgentGraph {
            nodes: self.nodes,
            edges: self.edges,
            subgraphs: self.subgraphs,
            entry,
            channels: self.channels,
        }
    }
}
