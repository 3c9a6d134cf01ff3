//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。
//! `[[topics]]` 是构图的唯一声明式输入：按名称引用已注册的工具。

use std::path::PathBuf;

use serde::Deserialize;

use crate::agents::HistoryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub retrieval: RetrievalSection,
    pub checkpoint: CheckpointSection,
    pub topics: Vec<TopicSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单个回合最多执行的步数，防止 Planner 与 Orchestrator 互相踢皮球
    pub max_steps_per_turn: usize,
    /// Agent 读取自身通道的默认方式：all / last
    pub default_history: HistoryPolicy,
    /// 商户画像占位值
    pub merchant_profile: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_steps_per_turn: 25,
            default_history: HistoryPolicy::All,
            merchant_profile: crate::core::NO_MERCHANT_PROFILE.to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段：工具超时、执行 Agent 的工具轮数上限、配置声明的固定回复工具
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 执行 Agent 内部「调用工具 -> 观察」的最大轮数
    pub max_tool_rounds: usize,
    pub canned: Vec<CannedToolSection>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_tool_rounds: 6,
            canned: Vec::new(),
        }
    }
}

/// [[tools.canned]]：名称、能力描述、固定返回文本
#[derive(Debug, Clone, Deserialize)]
pub struct CannedToolSection {
    pub name: String,
    pub description: String,
    pub response: String,
}

/// [retrieval] 段：各语料的 k 值与可选的 HTTP 检索端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub live_index_k: usize,
    pub past_resolutions_k: usize,
    pub guidelines_k: usize,
    pub live_index_url: Option<String>,
    pub past_resolutions_url: Option<String>,
    pub guidelines_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            live_index_k: 10,
            past_resolutions_k: 5,
            guidelines_k: 2,
            live_index_url: None,
            past_resolutions_url: None,
            guidelines_url: None,
            timeout_secs: 15,
        }
    }
}

/// [checkpoint] 段：memory / sqlite
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: String,
    pub path: PathBuf,
    /// 每个会话保留的检查点条数，0 表示不清理
    pub keep_last: usize,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: PathBuf::from("data/checkpoints.db"),
            keep_last: 0,
        }
    }
}

/// [[topics]]：一个业务领域及其工具（按注册名引用）
#[derive(Debug, Clone, Deserialize)]
pub struct TopicSection {
    pub name: String,
    #[serde(default)]
    pub read_tools: Vec<String>,
    #[serde(default)]
    pub update_tools: Vec<String>,
    #[serde(default)]
    pub knowledge_base_tools: Vec<String>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_steps_per_turn, 25);
        assert_eq!(cfg.app.default_history, HistoryPolicy::All);
        assert_eq!(cfg.retrieval.past_resolutions_k, 5);
        assert_eq!(cfg.retrieval.guidelines_k, 2);
        assert_eq!(cfg.retrieval.live_index_k, 10);
        assert_eq!(cfg.checkpoint.backend, "memory");
        assert!(cfg.topics.is_empty());
    }

    #[test]
    fn test_load_topics_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            r#"
[app]
default_history = "last"

[llm]
provider = "mock"

[[tools.canned]]
name = "get_feature_status"
description = "Reads feature status"
response = "enabled"

[[topics]]
name = "Billing"
read_tools = ["get_feature_status"]
knowledge_base_tools = ["past_successful_example"]
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.app.default_history, HistoryPolicy::Last);
        assert_eq!(cfg.app.max_steps_per_turn, 25);
        assert_eq!(cfg.tools.canned[0].name, "get_feature_status");
        assert_eq!(cfg.topics.len(), 1);
        assert!(cfg.topics[0].update_tools.is_empty());
    }
}
