//! 系统提示词模板
//!
//! 优先读取 config/prompts/<name>.txt，缺失时使用内置默认模板。占位符：
//! - planner：{latest_memory}、{merchant_profile}
//! - memory：{user_message}、{latest_memory}
//! - orchestrator：{routes}

/// 五类 Agent 的提示词模板
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub planner: String,
    pub read: String,
    pub update: String,
    pub memory: String,
    pub orchestrator: String,
}

const PLANNER: &str = "You are a customer support planner. Understand the user's request, decide whether a co-worker \
must do some work first, and reply to the user once you have what you need. Never invent account data.\n\
# Knowledge retrieved for this conversation:\n{latest_memory}\n\
# Merchant profile:\n{merchant_profile}\n";

const READ: &str = "You are a read-only support co-worker. Use your tools to look up the information requested \
in the task and report exactly what you found. Never change anything.";

const UPDATE: &str = "You are a support co-worker allowed to change merchant settings. Perform only the change \
described in the task, then report what was changed.";

const MEMORY: &str = "You decide whether the knowledge base must be consulted before planning.\n\
# Latest user message:\n{user_message}\n\
# Knowledge already retrieved:\n{latest_memory}\n\
If the retrieved knowledge does not cover the user message, call one knowledge tool with a focused query. \
Otherwise answer that no retrieval is needed.";

const ORCHESTRATOR: &str = "You route customer support conversations to the department that handles them. \
Available departments: {routes}. Pick exactly one.";

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            planner: PLANNER.to_string(),
            read: READ.to_string(),
            update: UPDATE.to_string(),
            memory: MEMORY.to_string(),
            orchestrator: ORCHESTRATOR.to_string(),
        }
    }
}

impl PromptSet {
    /// 从 config/prompts 目录加载，逐个回退到默认模板
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            planner: read_prompt("planner").unwrap_or(defaults.planner),
            read: read_prompt("read").unwrap_or(defaults.read),
            update: read_prompt("update").unwrap_or(defaults.update),
            memory: read_prompt("memory").unwrap_or(defaults.memory),
            orchestrator: read_prompt("orchestrator").unwrap_or(defaults.orchestrator),
        }
    }
}

fn read_prompt(name: &str) -> Option<String> {
    [
        format!("config/prompts/{}.txt", name),
        format!("../config/prompts/{}.txt", name),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
}

/// 替换模板中的 {key} 占位符；未出现的占位符保持原样
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
