//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及基于其上的决策 Oracle

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod oracle;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, MockOracle, ScriptedOracle};
pub use openai::{OpenAiClient, TokenUsage};
pub use oracle::{
    decide_checked, parse_decision, Decision, DecisionOracle, DecisionRequest, DecisionShape,
    LlmOracle,
};
pub use traits::LlmClient;

use crate::config::AppConfig;

/// 根据配置与环境变量选择 Oracle 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_oracle_from_config(cfg: &AppConfig) -> Arc<dyn DecisionOracle> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock oracle");
        return Arc::new(MockOracle);
    }

    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    let llm: Arc<dyn LlmClient> = if use_deepseek {
        let model = cfg.llm.model.clone().unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock oracle");
        return Arc::new(MockOracle);
    };
    Arc::new(LlmOracle::new(llm).with_timeout(cfg.llm.timeouts.request))
}
