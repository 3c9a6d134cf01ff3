//! 知识库工具：记忆 Agent 绑定的检索工具
//!
//! - past_successful_example：历史相似工单及人工答复、推导出的政策（k=5）
//! - what_human_would_do：人工客服处理指引（k=2）
//! - rag_agent_tool：实时向量索引（k=10），直接返回命中文本
//!
//! 参数统一为 {"query": "...", "thought": "..."}，thought 只用于让模型说明选择理由，不参与检索。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::{RetrievalGateway, SearchHit};
use crate::tools::Tool;

const PAST_EXAMPLES_PREAMBLE: &str = "Below is past similar user query, its resolution and probable company policy derived from it. \
You need to refer it as hint to figure out if this will be applicable to current query and answer accordingly. \
Many a times you may see that for some task support ticket was created and internal team completed the task. \
But since you might be having access to internal tools, you can now do it which was previously done by internal team. \
But before doing anything using tools do check policies.\n";

const GUIDELINES_PREAMBLE: &str = "Below is the probable instruction doc for human agent to follow for resolving user query. \
You can use this as a guideline to understand what to do for resolving user query.\n";

fn query_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search query" },
            "thought": {
                "type": "string",
                "description": "Analysis of all previous step and detailed reason for selecting current tool/step"
            }
        },
        "required": ["query", "thought"]
    })
}

fn query_arg(args: &Value) -> Result<&str, String> {
    args.get("query")
        .and_then(|v| v.as_str())
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| "missing 'query' argument".to_string())
}

/// 缺失的标签按空串处理
fn tag<'a>(hit: &'a SearchHit, key: &str) -> &'a str {
    hit.tags.get(key).map(String::as_str).unwrap_or("")
}

/// 历史工单检索
pub struct PastResolutionsTool {
    gateway: Arc<dyn RetrievalGateway>,
    k: usize,
}

impl PastResolutionsTool {
    pub const NAME: &'static str = "past_successful_example";

    pub fn new(gateway: Arc<dyn RetrievalGateway>, k: usize) -> Self {
        Self { gateway, k }
    }
}

#[async_trait]
impl Tool for PastResolutionsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Shows how similar queries were handled in the past, with the human support answer and the policy or process derived from it. \
If a similar query has been resolved before, it is better to follow the same path."
    }

    fn parameters_schema(&self) -> Value {
        query_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_arg(&args)?;
        let hits = self
            .gateway
            .search(query, self.k)
            .await
            .map_err(|e| e.to_string())?;

        let mut text = PAST_EXAMPLES_PREAMBLE.to_string();
        for (i, hit) in hits.iter().enumerate() {
            let n = i + 1;
            text.push_str(&format!(
                "Past user query: {n}: {}\nPast answer by human support team {n}: {}\nDerived process or policy from this conversation {n}: {}\n\n",
                hit.content,
                tag(hit, "answer"),
                tag(hit, "derived_policies_or_process"),
            ));
        }
        Ok(text)
    }
}

/// 人工客服指引检索
pub struct GuidelinesTool {
    gateway: Arc<dyn RetrievalGateway>,
    k: usize,
}

impl GuidelinesTool {
    pub const NAME: &'static str = "what_human_would_do";

    pub fn new(gateway: Arc<dyn RetrievalGateway>, k: usize) -> Self {
        Self { gateway, k }
    }
}

#[async_trait]
impl Tool for GuidelinesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Retrieves the guideline or process internal human support agents follow to resolve user queries. \
Use it to understand and plan how to resolve the user query."
    }

    fn parameters_schema(&self) -> Value {
        query_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_arg(&args)?;
        let hits = self
            .gateway
            .search(query, self.k)
            .await
            .map_err(|e| e.to_string())?;

        let mut text = GUIDELINES_PREAMBLE.to_string();
        for (i, hit) in hits.iter().enumerate() {
            text.push_str(&format!("Human instruction doc: {}: {}\n", i + 1, hit.content));
        }
        Ok(text)
    }
}

/// 实时向量索引检索
pub struct LiveIndexTool {
    gateway: Arc<dyn RetrievalGateway>,
    k: usize,
}

impl LiveIndexTool {
    pub const NAME: &'static str = "rag_agent_tool";

    pub fn new(gateway: Arc<dyn RetrievalGateway>, k: usize) -> Self {
        Self { gateway, k }
    }
}

#[async_trait]
impl Tool for LiveIndexTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Retrieves information from the vector database according to the query: policy docs, FAQs, or the process to follow to resolve an issue."
    }

    fn parameters_schema(&self) -> Value {
        query_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_arg(&args)?;
        let hits = self
            .gateway
            .search(query, self.k)
            .await
            .map_err(|e| e.to_string())?;
        let texts: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        Ok(texts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use crate::memory::InMemoryGateway;
    use async_trait::async_trait;

    fn past_corpus() -> Arc<dyn RetrievalGateway> {
        Arc::new(
            InMemoryGateway::new()
                .with_tagged_document(
                    "I was charged twice for one order",
                    &[
                        ("answer", "We refunded the duplicate charge"),
                        ("derived_policies_or_process", "Refund duplicates within 7 days"),
                    ],
                )
                .with_document("charged a fee on refund"),
        )
    }

    #[tokio::test]
    async fn test_past_resolutions_format() {
        let tool = PastResolutionsTool::new(past_corpus(), 5);
        let out = tool
            .execute(serde_json::json!({"query": "charged twice", "thought": "check history"}))
            .await
            .unwrap();
        assert!(out.starts_with("Below is past similar user query"));
        assert!(out.contains("Past user query: 1: I was charged twice for one order"));
        assert!(out.contains("Past answer by human support team 1: We refunded the duplicate charge"));
        assert!(out.contains("Derived process or policy from this conversation 1: Refund duplicates within 7 days"));
        // 缺失标签输出为空串
        assert!(out.contains("Past answer by human support team 2: \n"));
    }

    #[tokio::test]
    async fn test_guidelines_respects_k() {
        let gw: Arc<dyn RetrievalGateway> = Arc::new(
            InMemoryGateway::new()
                .with_document("refund steps one")
                .with_document("refund steps two")
                .with_document("refund steps three"),
        );
        let out = GuidelinesTool::new(gw, 2)
            .execute(serde_json::json!({"query": "refund", "thought": ""}))
            .await
            .unwrap();
        assert!(out.contains("Human instruction doc: 2:"));
        assert!(!out.contains("Human instruction doc: 3:"));
    }

    #[tokio::test]
    async fn test_missing_query_is_error() {
        let tool = LiveIndexTool::new(past_corpus(), 10);
        assert!(tool.execute(serde_json::json!({"thought": "x"})).await.is_err());
    }

    struct DownGateway;

    #[async_trait]
    impl RetrievalGateway for DownGateway {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>, AgentError> {
            Err(AgentError::RetrievalError("index unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let tool = LiveIndexTool::new(Arc::new(DownGateway), 10);
        let err = tool
            .execute(serde_json::json!({"query": "anything"}))
            .await
            .unwrap_err();
        assert!(err.contains("index unavailable"));
    }
}
