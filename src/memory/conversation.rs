//! 消息模型
//!
//! 通道中的单条消息：角色、内容、发言者名，以及 Oracle 请求的工具调用（assistant）或工具结果对应的调用 ID（tool）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，另含工具结果）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 一次工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCall {
    /// 调用 ID，可留空，由运行时补齐
    #[serde(default)]
    pub id: String,
    /// 工具名，必须是当前 Agent 绑定的工具之一
    pub tool: String,
    /// 工具参数（JSON 对象）
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 发言者（Agent 名或工具名）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// 工具结果消息，关联发起它的调用 ID
    pub fn tool(content: impl Into<String>, call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// assistant 消息且携带工具调用请求
    pub fn is_tool_call_request(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_request_detection() {
        let plain = Message::assistant("hello");
        assert!(!plain.is_tool_call_request());

        let call = ToolCall {
            id: "call_0".into(),
            tool: "past_successful_example".into(),
            args: serde_json::json!({"query": "double charge"}),
        };
        let req = Message::assistant("").with_tool_calls(vec![call]);
        assert!(req.is_tool_call_request());

        let result = Message::tool("refund policy", "call_0");
        assert!(result.is_tool_result());
        assert_eq!(result.tool_call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
