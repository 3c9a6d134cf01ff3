//! Agent 配置树
//!
//! 由声明式 Topic 列表一次性构建：orchestrator -> 每个 Topic 的 planner -> (read / update 执行 Agent + memory Agent)。
//! 构建分两遍：第一遍自下而上生成各节点配置，第二遍回填 planner -> orchestrator 的反向引用（只存名称，不形成引用环）。

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::prompts::PromptSet;
use crate::config::TopicSection;
use crate::core::{AgentError, GLOBAL_CHANNEL};
use crate::memory::Message;
use crate::tools::{Tool, ToolRegistry};

pub const ORCHESTRATOR_NAME: &str = "orchestrator_agent";

/// Agent 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Planner,
    Read,
    Update,
    Orchestrator,
    Memory,
}

/// 读取自身通道的方式：全部历史或仅最新一条
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryPolicy {
    #[default]
    All,
    Last,
}

impl HistoryPolicy {
    /// 按策略截取通道消息；Last 时最新一条作为用户输入交给模型
    pub fn select(&self, channel: &[Message]) -> Vec<Message> {
        match self {
            HistoryPolicy::All => channel.to_vec(),
            HistoryPolicy::Last => channel
                .last()
                .map(|m| vec![Message::user(m.content.clone())])
                .unwrap_or_default(),
        }
    }
}

/// 一个业务领域：名称 + 只读工具 + 变更工具 + 知识库工具
#[derive(Clone)]
pub struct Topic {
    pub name: String,
    pub read_tools: Vec<Arc<dyn Tool>>,
    pub update_tools: Vec<Arc<dyn Tool>>,
    pub knowledge_base_tools: Vec<Arc<dyn Tool>>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_tools: Vec::new(),
            update_tools: Vec::new(),
            knowledge_base_tools: Vec::new(),
        }
    }

    pub fn read_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.read_tools.push(Arc::new(tool));
        self
    }

    pub fn update_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.update_tools.push(Arc::new(tool));
        self
    }

    pub fn knowledge_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.knowledge_base_tools.push(Arc::new(tool));
        self
    }

    /// 由配置段解析：工具按名称从注册表查找
    pub fn from_section(section: &TopicSection, registry: &ToolRegistry) -> Result<Self, AgentError> {
        Ok(Self {
            name: section.name.clone(),
            read_tools: registry.resolve(&section.read_tools)?,
            update_tools: registry.resolve(&section.update_tools)?,
            knowledge_base_tools: registry.resolve(&section.knowledge_base_tools)?,
        })
    }
}

/// 单个 Agent 的不可变配置
#[derive(Clone)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub name: String,
    /// 所属 Topic（orchestrator 为空）
    pub topic: String,
    /// 执行完毕后交还控制的节点
    pub parent_name: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub system_prompt: String,
    pub channel: String,
    pub history: HistoryPolicy,
    pub co_workers: Vec<AgentConfig>,
    /// 每个同事的能力说明，已拼入 planner 的 system_prompt
    pub co_worker_abilities: Vec<String>,
    pub routes: Vec<AgentConfig>,
    pub memory: Option<Box<AgentConfig>>,
    /// 上级 orchestrator 名（第二遍回填）
    pub orchestrator: Option<String>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tools: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("AgentConfig")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("parent_name", &self.parent_name)
            .field("channel", &self.channel)
            .field("tools", &tools)
            .field("co_workers", &self.co_workers)
            .field("routes", &self.routes)
            .field("memory", &self.memory)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl AgentConfig {
    fn leaf(
        kind: AgentKind,
        name: String,
        topic: &str,
        parent_name: &str,
        tools: Vec<Arc<dyn Tool>>,
        system_prompt: &str,
        history: HistoryPolicy,
    ) -> Self {
        let channel = format!("{}_messages", name);
        Self {
            kind,
            name,
            topic: topic.to_string(),
            parent_name: parent_name.to_string(),
            tools,
            system_prompt: system_prompt.to_string(),
            channel,
            history,
            co_workers: Vec::new(),
            co_worker_abilities: Vec::new(),
            routes: Vec::new(),
            memory: None,
            orchestrator: None,
        }
    }

    pub fn co_worker_names(&self) -> Vec<&str> {
        self.co_workers.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.topic.as_str()).collect()
    }
}

/// 同事能力说明：Planner 委派时据此挑选执行者
fn ability_briefing(index: usize, name: &str, tools: &[Arc<dyn Tool>]) -> String {
    let abilities: Vec<String> = tools
        .iter()
        .enumerate()
        .map(|(i, t)| format!("Ability {}: {}", i + 1, t.description()))
        .collect();
    format!(
        "# Co-worker {} details:\n## Name: {}\n## Abilities:\n{}",
        index,
        name,
        abilities.join("\n")
    )
}

/// 构建单个 Topic 的 planner 配置（含执行同事与记忆 Agent）
pub fn build_topic_config(
    topic: &Topic,
    prompts: &PromptSet,
    history: HistoryPolicy,
) -> Result<AgentConfig, AgentError> {
    if topic.name.trim().is_empty() {
        return Err(AgentError::ConfigError("topic name must not be empty".into()));
    }
    if topic.read_tools.is_empty() && topic.update_tools.is_empty() {
        return Err(AgentError::ConfigError(format!(
            "topic '{}' has neither read nor update tools",
            topic.name
        )));
    }
    if topic.knowledge_base_tools.is_empty() {
        return Err(AgentError::ConfigError(format!(
            "topic '{}' has no knowledge base tools for its memory agent",
            topic.name
        )));
    }

    let planner_name = format!("{}_agent", topic.name);
    let groups = [
        (AgentKind::Read, "read", &topic.read_tools, &prompts.read),
        (AgentKind::Update, "update", &topic.update_tools, &prompts.update),
    ];

    let mut co_workers = Vec::new();
    let mut abilities = Vec::new();
    for (kind, label, tools, prompt) in groups {
        if tools.is_empty() {
            continue;
        }
        let name = format!("{}_{}_agent", topic.name, label);
        abilities.push(ability_briefing(co_workers.len() + 1, &name, tools));
        co_workers.push(AgentConfig::leaf(
            kind,
            name,
            &topic.name,
            &planner_name,
            tools.clone(),
            prompt,
            history,
        ));
    }

    let memory = AgentConfig::leaf(
        AgentKind::Memory,
        format!("{}_memory_agent", topic.name),
        &topic.name,
        &planner_name,
        topic.knowledge_base_tools.clone(),
        &prompts.memory,
        HistoryPolicy::All,
    );

    let system_prompt = format!(
        "{}\n# Below are the details of co-worker available for delegation.\n{}",
        prompts.planner,
        abilities.join("\n")
    );

    Ok(AgentConfig {
        kind: AgentKind::Planner,
        name: planner_name,
        topic: topic.name.clone(),
        parent_name: String::new(),
        tools: Vec::new(),
        system_prompt,
        channel: GLOBAL_CHANNEL.to_string(),
        history,
        co_workers,
        co_worker_abilities: abilities,
        routes: Vec::new(),
        memory: Some(Box::new(memory)),
        orchestrator: None,
    })
}

/// 构建完整配置树：orchestrator 在根，每个 Topic 一棵子树
pub fn build_agent_config(
    topics: &[Topic],
    prompts: &PromptSet,
    history: HistoryPolicy,
) -> Result<AgentConfig, AgentError> {
    if topics.is_empty() {
        return Err(AgentError::ConfigError("at least one topic is required".into()));
    }
    let mut seen = HashSet::new();
    for topic in topics {
        if !seen.insert(topic.name.as_str()) {
            return Err(AgentError::ConfigError(format!("duplicate topic '{}'", topic.name)));
        }
    }

    let mut routes = topics
        .iter()
        .map(|t| build_topic_config(t, prompts, history))
        .collect::<Result<Vec<_>, _>>()?;

    // 第二遍：回填反向引用
    for route in &mut routes {
        route.orchestrator = Some(ORCHESTRATOR_NAME.to_string());
        route.parent_name = ORCHESTRATOR_NAME.to_string();
    }

    let topic_names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
    let system_prompt = crate::agents::prompts::render(
        &prompts.orchestrator,
        &[("routes", topic_names.join(", ").as_str())],
    );

    Ok(AgentConfig {
        kind: AgentKind::Orchestrator,
        name: ORCHESTRATOR_NAME.to_string(),
        topic: String::new(),
        parent_name: String::new(),
        tools: Vec::new(),
        system_prompt,
        channel: GLOBAL_CHANNEL.to_string(),
        history,
        co_workers: Vec::new(),
        co_worker_abilities: Vec::new(),
        routes,
        memory: None,
        orchestrator: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;

    fn billing() -> Topic {
        Topic::new("Billing")
            .read_tool(FnTool::canned("get_refund_source", "Returns the refund source.", "card"))
            .update_tool(FnTool::canned("update_refund_source", "Changes the refund source.", "ok"))
            .knowledge_tool(FnTool::canned("past_successful_example", "Past tickets.", "none"))
    }

    #[test]
    fn test_topic_config_names_and_channels() {
        let cfg = build_topic_config(&billing(), &PromptSet::default(), HistoryPolicy::All).unwrap();
        assert_eq!(cfg.kind, AgentKind::Planner);
        assert_eq!(cfg.name, "Billing_agent");
        assert_eq!(cfg.channel, GLOBAL_CHANNEL);
        assert_eq!(cfg.co_worker_names(), vec!["Billing_read_agent", "Billing_update_agent"]);
        assert_eq!(cfg.co_workers[0].channel, "Billing_read_agent_messages");
        assert_eq!(cfg.co_workers[1].parent_name, "Billing_agent");
        assert_eq!(cfg.co_workers[1].kind, AgentKind::Update);

        let memory = cfg.memory.as_ref().unwrap();
        assert_eq!(memory.name, "Billing_memory_agent");
        assert_eq!(memory.channel, "Billing_memory_agent_messages");
        assert!(cfg.orchestrator.is_none());
    }

    #[test]
    fn test_ability_briefing_uses_descriptions_verbatim() {
        let cfg = build_topic_config(&billing(), &PromptSet::default(), HistoryPolicy::All).unwrap();
        assert!(cfg.system_prompt.contains("# Co-worker 1 details:\n## Name: Billing_read_agent"));
        assert!(cfg.system_prompt.contains("Ability 1: Returns the refund source."));
        assert!(cfg.system_prompt.contains("# Co-worker 2 details:\n## Name: Billing_update_agent"));
        assert_eq!(cfg.co_worker_abilities.len(), 2);
    }

    #[test]
    fn test_only_non_empty_groups_become_workers() {
        let topic = Topic::new("Accounts")
            .read_tool(FnTool::canned("get_merchant_details", "Merchant details.", "x"))
            .knowledge_tool(FnTool::canned("what_human_would_do", "Guidelines.", "y"));
        let cfg = build_topic_config(&topic, &PromptSet::default(), HistoryPolicy::Last).unwrap();
        assert_eq!(cfg.co_worker_names(), vec!["Accounts_read_agent"]);
        assert_eq!(cfg.co_workers[0].history, HistoryPolicy::Last);
    }

    #[test]
    fn test_missing_tool_groups_are_config_errors() {
        let no_workers = Topic::new("Empty")
            .knowledge_tool(FnTool::canned("kb", "kb", "kb"));
        assert!(build_topic_config(&no_workers, &PromptSet::default(), HistoryPolicy::All)
            .unwrap_err()
            .is_config());

        let no_memory = Topic::new("NoKb").read_tool(FnTool::canned("r", "r", "r"));
        assert!(build_topic_config(&no_memory, &PromptSet::default(), HistoryPolicy::All)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_orchestrator_back_references() {
        let accounts = Topic::new("Accounts")
            .read_tool(FnTool::canned("get_merchant_details", "Merchant details.", "x"))
            .knowledge_tool(FnTool::canned("what_human_would_do", "Guidelines.", "y"));
        let root = build_agent_config(&[billing(), accounts], &PromptSet::default(), HistoryPolicy::All)
            .unwrap();
        assert_eq!(root.kind, AgentKind::Orchestrator);
        assert_eq!(root.route_names(), vec!["Billing", "Accounts"]);
        assert!(root
            .routes
            .iter()
            .all(|r| r.orchestrator.as_deref() == Some(ORCHESTRATOR_NAME)));
        assert!(root.system_prompt.contains("Billing, Accounts"));
    }

    #[test]
    fn test_duplicate_topics_rejected() {
        let err = build_agent_config(&[billing(), billing()], &PromptSet::default(), HistoryPolicy::All)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_history_policy_select() {
        let msgs = vec![Message::assistant("task 1"), Message::assistant("task 2")];
        assert_eq!(HistoryPolicy::All.select(&msgs).len(), 2);
        let last = HistoryPolicy::Last.select(&msgs);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content, "task 2");
        assert!(HistoryPolicy::Last.select(&[]).is_empty());
    }
}
