//! 决策 JSON Schema 生成（schemars）
//!
//! 将 Decision 的完整 Schema 与本次允许的 kind、工具、路由拼成一段说明，注入 LLM 的 system prompt，减少输出格式错误。

use schemars::schema_for;

use crate::llm::{Decision, DecisionRequest};

/// 返回 Decision 的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    let schema = schema_for!(Decision);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 为一次决策请求生成输出格式说明
pub fn decision_instructions(request: &DecisionRequest) -> String {
    let kinds: Vec<&str> = request.allowed.iter().map(|s| s.as_str()).collect();
    let mut text = format!(
        "Respond with exactly one JSON object and nothing else. Its \"kind\" must be one of: {}.\nJSON Schema:\n{}\n",
        kinds.join(", "),
        decision_schema_json()
    );
    if !request.tools.is_empty() {
        let tools = serde_json::to_string_pretty(&request.tools).unwrap_or_else(|_| "[]".to_string());
        text.push_str(&format!("Available tools for \"call_tools\":\n{}\n", tools));
    }
    if !request.routes.is_empty() {
        text.push_str(&format!(
            "\"route\" must be one of: {}\n",
            request.routes.join(", ")
        ));
    }
    text
}
