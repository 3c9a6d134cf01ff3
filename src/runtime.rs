//! 会话运行时：由 AppConfig 组装工具、Topic、图与检查点存储，对外提供按会话的回合 API

use std::sync::Arc;

use crate::agents::{build_agent_config, PromptSet, Topic};
use crate::config::{AppConfig, CheckpointSection};
use crate::core::AgentError;
use crate::graph::{GraphBuilder, GraphEngine, TurnOutcome};
use crate::llm::DecisionOracle;
use crate::memory::{
    Checkpointer, HttpGateway, InMemoryCheckpointer, InMemoryGateway, Message, RetrievalGateway,
    SqliteCheckpointer,
};
use crate::tools::{FnTool, GuidelinesTool, LiveIndexTool, PastResolutionsTool, ToolRegistry};

pub struct HiveRuntime {
    engine: GraphEngine,
}

impl HiveRuntime {
    pub fn new(engine: GraphEngine) -> Self {
        Self { engine }
    }

    /// 使用默认工具注册表（知识库工具 + 配置中的固定回复工具）
    pub fn from_config(cfg: &AppConfig, oracle: Arc<dyn DecisionOracle>) -> Result<Self, AgentError> {
        let registry = default_registry(cfg)?;
        Self::with_registry(cfg, &registry, oracle)
    }

    /// 使用调用方提供的注册表；[[topics]] 中的工具名按此解析
    pub fn with_registry(
        cfg: &AppConfig,
        registry: &ToolRegistry,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Result<Self, AgentError> {
        let topics = cfg
            .topics
            .iter()
            .map(|section| Topic::from_section(section, registry))
            .collect::<Result<Vec<_>, _>>()?;
        let root = build_agent_config(&topics, &PromptSet::load(), cfg.app.default_history)?;
        let graph = GraphBuilder::new()
            .tool_timeout(cfg.tools.tool_timeout_secs)
            .max_tool_rounds(cfg.tools.max_tool_rounds)
            .build(&root)?;

        let engine = GraphEngine::new(Arc::new(graph), oracle, open_checkpointer(&cfg.checkpoint)?)
            .max_steps(cfg.app.max_steps_per_turn)
            .keep_last(cfg.checkpoint.keep_last)
            .merchant_profile(cfg.app.merchant_profile.clone());
        Ok(Self::new(engine))
    }

    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub async fn run_turn(&self, session_id: &str, user_text: &str) -> Result<TurnOutcome, AgentError> {
        self.engine.run_turn(session_id, user_text).await
    }

    pub async fn resume(&self, session_id: &str) -> Result<TurnOutcome, AgentError> {
        self.engine.resume(session_id).await
    }

    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        self.engine.transcript(session_id).await
    }

    pub fn describe(&self) -> String {
        self.engine.graph().describe()
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }
}

/// 知识库工具（按 [retrieval] 配置选择 HTTP 或内存网关）+ [[tools.canned]]
pub fn default_registry(cfg: &AppConfig) -> Result<ToolRegistry, AgentError> {
    let r = &cfg.retrieval;
    let mut registry = ToolRegistry::new();
    registry.register(PastResolutionsTool::new(
        gateway(r.past_resolutions_url.as_deref(), r.timeout_secs)?,
        r.past_resolutions_k,
    ));
    registry.register(GuidelinesTool::new(
        gateway(r.guidelines_url.as_deref(), r.timeout_secs)?,
        r.guidelines_k,
    ));
    registry.register(LiveIndexTool::new(
        gateway(r.live_index_url.as_deref(), r.timeout_secs)?,
        r.live_index_k,
    ));
    for canned in &cfg.tools.canned {
        registry.register(FnTool::canned(
            canned.name.clone(),
            canned.description.clone(),
            canned.response.clone(),
        ));
    }
    Ok(registry)
}

fn gateway(url: Option<&str>, timeout_secs: u64) -> Result<Arc<dyn RetrievalGateway>, AgentError> {
    match url {
        Some(url) => Ok(Arc::new(HttpGateway::new(url, timeout_secs)?)),
        None => Ok(Arc::new(InMemoryGateway::new())),
    }
}

pub fn open_checkpointer(section: &CheckpointSection) -> Result<Arc<dyn Checkpointer>, AgentError> {
    match section.backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryCheckpointer::new())),
        "sqlite" => {
            tracing::info!(path = %section.path.display(), "Using sqlite checkpoints");
            Ok(Arc::new(SqliteCheckpointer::open(&section.path)?))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown checkpoint backend '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CannedToolSection, TopicSection};
    use crate::llm::MockOracle;

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.tools.canned.push(CannedToolSection {
            name: "get_merchant_details".into(),
            description: "Returns merchant details.".into(),
            response: "merchant is active".into(),
        });
        cfg.topics.push(TopicSection {
            name: "Accounts".into(),
            read_tools: vec!["get_merchant_details".into()],
            update_tools: vec![],
            knowledge_base_tools: vec!["what_human_would_do".into()],
        });
        cfg
    }

    #[test]
    fn test_default_registry_has_knowledge_and_canned_tools() {
        let registry = default_registry(&config()).unwrap();
        for name in [
            "past_successful_example",
            "what_human_would_do",
            "rag_agent_tool",
            "get_merchant_details",
        ] {
            assert!(registry.contains(name), "{name}");
        }
    }

    #[test]
    fn test_unknown_tool_in_topic_is_config_error() {
        let mut cfg = config();
        cfg.topics[0].read_tools.push("drop_database".into());
        let err = HiveRuntime::from_config(&cfg, Arc::new(MockOracle)).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_unknown_checkpoint_backend() {
        let section = CheckpointSection {
            backend: "redis".into(),
            ..Default::default()
        };
        assert!(open_checkpointer(&section).err().unwrap().is_config());
    }

    #[tokio::test]
    async fn test_mock_turn_end_to_end() {
        let runtime = HiveRuntime::from_config(&config(), Arc::new(MockOracle)).unwrap();
        let session = HiveRuntime::new_session_id();
        let outcome = runtime.run_turn(&session, "hello").await.unwrap();
        assert_eq!(outcome.reply.as_deref(), Some("Echo from Mock: hello"));

        let transcript = runtime.transcript(&session).await.unwrap();
        assert_eq!(transcript.first().unwrap().content, "hello");
        assert!(runtime.describe().contains("Accounts_memory_agent"));
    }
}
