//! 闭包工具
//!
//! 以闭包实现 Tool，用于接入外部领域动作（查询商户配置、切换手续费承担方等）或按配置返回固定文本。

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

type ToolFn = dyn Fn(Value) -> Result<String, String> + Send + Sync;

/// 闭包工具：名称 + 描述 + 同步处理函数
pub struct FnTool {
    name: String,
    description: String,
    parameters: Option<Value>,
    handler: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            handler: Box::new(handler),
        }
    }

    /// 固定返回 response 的工具
    pub fn canned(
        name: impl Into<String>,
        description: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        let response = response.into();
        Self::new(name, description, move |_| Ok(response.clone()))
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            })
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        (self.handler)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_canned_tool() {
        let tool = FnTool::canned("get_merchant_config", "Reads merchant config", "fee_bearer=platform");
        assert_eq!(tool.execute(Value::Null).await.unwrap(), "fee_bearer=platform");
    }

    #[tokio::test]
    async fn test_handler_sees_args() {
        let tool = FnTool::new("echo", "Echo text", |args| {
            args.get("text")
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| "missing text".to_string())
        });
        assert_eq!(tool.execute(serde_json::json!({"text": "hi"})).await.unwrap(), "hi");
        assert!(tool.execute(Value::Null).await.is_err());
    }
}
