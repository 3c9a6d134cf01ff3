//! 检索网关：对知识语料做相似度检索
//!
//! 三个语料（实时向量索引、历史工单解决方案、人工客服指引）共用同一接口 search(query, k)。
//! 内置 InMemoryGateway（关键词重叠打分，适合测试与本地演示）与 HttpGateway（POST JSON 到外部检索服务）。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 一条检索命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// 检索网关 trait：按相关度降序返回至多 k 条
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AgentError>;
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 内存实现：按关键词重叠检索（无真实向量）
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    store: Arc<RwLock<Vec<(SearchHit, HashSet<String>)>>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存入一段文本及其标签
    pub fn add(&self, content: &str, tags: HashMap<String, String>) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let tokens = tokenize_lower(content);
        match self.store.write() {
            Ok(mut store) => store.push((
                SearchHit {
                    content: content.to_string(),
                    score: 0.0,
                    tags,
                },
                tokens,
            )),
            Err(e) => tracing::warn!(error = %e, "in-memory gateway lock poisoned, document dropped"),
        }
    }

    pub fn with_document(self, content: &str) -> Self {
        self.add(content, HashMap::new());
        self
    }

    pub fn with_tagged_document(self, content: &str, tags: &[(&str, &str)]) -> Self {
        let tags = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.add(content, tags);
        self
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RetrievalGateway for InMemoryGateway {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AgentError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let store = self
            .store
            .read()
            .map_err(|e| AgentError::RetrievalError(e.to_string()))?;

        // 分数：命中查询词占比
        let mut scored: Vec<SearchHit> = store
            .iter()
            .filter_map(|(hit, doc_tokens)| {
                let overlap = query_tokens.intersection(doc_tokens).count();
                (overlap > 0).then(|| SearchHit {
                    score: overlap as f32 / query_tokens.len() as f32,
                    ..hit.clone()
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

/// HTTP 检索网关：POST {"query", "k"}，期望返回 {"hits": [{content, score, tags}]}
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::ConfigError(format!("http gateway: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RetrievalGateway for HttpGateway {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AgentError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest { query, k })
            .send()
            .await
            .map_err(|e| AgentError::RetrievalError(e.to_string()))?
            .error_for_status()
            .map_err(|e| AgentError::RetrievalError(e.to_string()))?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::RetrievalError(format!("malformed response: {}", e)))?;
        let mut hits = body.hits;
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poisoned_store_drops_document_and_search_errors() {
        let gw = InMemoryGateway::new();
        let store = gw.store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = store.write().unwrap();
            panic!("poison");
        })
        .join();

        gw.add("customer charged twice", HashMap::new());
        assert!(matches!(
            gw.search("charged", 3).await,
            Err(AgentError::RetrievalError(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_ranks_by_overlap() {
        let gw = InMemoryGateway::new()
            .with_document("refund for duplicate charge on card")
            .with_document("how to enable international payments")
            .with_document("duplicate charge");

        let hits = gw.search("why was I charged twice, duplicate charge", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.content.contains("duplicate")));
    }

    #[tokio::test]
    async fn test_in_memory_respects_k_and_empty_query() {
        let gw = InMemoryGateway::new()
            .with_document("alpha beta")
            .with_document("alpha gamma")
            .with_document("alpha delta");
        assert_eq!(gw.search("alpha", 2).await.unwrap().len(), 2);
        assert!(gw.search("  ", 2).await.unwrap().is_empty());
        assert_eq!(gw.len(), 3);
    }

    #[tokio::test]
    async fn test_tags_are_returned() {
        let gw = InMemoryGateway::new()
            .with_tagged_document("charged twice", &[("answer", "refund issued")]);
        let hits = gw.search("charged twice", 1).await.unwrap();
        assert_eq!(hits[0].tags.get("answer").map(String::as_str), Some("refund issued"));
    }
}
