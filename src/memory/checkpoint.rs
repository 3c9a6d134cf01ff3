//! 会话检查点
//!
//! 每完成一步就追加一条检查点：完整状态快照 + 下一个待执行节点（回合结束时为空）。
//! 失败的步骤不写检查点，最近一条检查点即为恢复点。提供内存与 SQLite（rusqlite）两种存储。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{AgentError, ConversationState};
use crate::graph::NodeId;

/// 单条检查点
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    /// 会话内单调递增的步号
    pub step: u64,
    pub state: ConversationState,
    /// 下一个待执行节点；None 表示回合已结束
    pub next: Option<NodeId>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

impl Checkpoint {
    pub fn new(
        session_id: impl Into<String>,
        step: u64,
        state: ConversationState,
        next: Option<NodeId>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step,
            state,
            next,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 检查点存储接口（按会话 ID 追加）
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError>;

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError>;

    /// 按写入顺序返回会话全部检查点
    async fn history(&self, session_id: &str) -> Result<Vec<Checkpoint>, AgentError>;

    /// 只保留最近 keep 条，返回删除条数
    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, AgentError>;
}

/// 内存检查点存储
#[derive(Default)]
pub struct InMemoryCheckpointer {
    sessions: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        self.sessions
            .write()
            .await
            .entry(checkpoint.session_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .and_then(|cps| cps.last().cloned()))
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Checkpoint>, AgentError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, AgentError> {
        let mut sessions = self.sessions.write().await;
        let Some(cps) = sessions.get_mut(session_id) else {
            return Ok(0);
        };
        let excess = cps.len().saturating_sub(keep);
        cps.drain(..excess);
        Ok(excess as u64)
    }
}

/// SQLite 检查点存储：状态以 JSON 文本保存
pub struct SqliteCheckpointer {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AgentError::CheckpointError(e.to_string()))?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                state TEXT NOT NULL,
                next_node TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AgentError> {
        self.conn
            .lock()
            .map_err(|e| AgentError::CheckpointError(e.to_string()))
    }
}

type CheckpointRow = (String, i64, String, Option<String>, i64);

fn row_to_checkpoint(row: CheckpointRow) -> Result<Checkpoint, AgentError> {
    let (session_id, step, state, next, created_at) = row;
    Ok(Checkpoint {
        session_id,
        step: step as u64,
        state: serde_json::from_str(&state)?,
        next,
        created_at,
    })
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO checkpoints (session_id, step, state, next_node, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.session_id,
                checkpoint.step as i64,
                state,
                checkpoint.next,
                checkpoint.created_at
            ],
        )?;
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let row: Option<CheckpointRow> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT session_id, step, state, next_node, created_at FROM checkpoints
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?
        };
        row.map(row_to_checkpoint).transpose()
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Checkpoint>, AgentError> {
        let rows: Vec<CheckpointRow> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT session_id, step, state, next_node, created_at FROM checkpoints
                 WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![session_id], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(row_to_checkpoint).collect()
    }

    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, AgentError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1 AND id NOT IN (
                SELECT id FROM checkpoints WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
            )",
            params![session_id, keep as i64],
        )?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StatePatch, GLOBAL_CHANNEL};
    use crate::memory::Message;
    use tempfile::TempDir;

    fn checkpoint(step: u64, text: &str, next: Option<&str>) -> Checkpoint {
        let mut state = ConversationState::with_channels(["Billing_memory_agent_messages"]);
        state
            .apply(StatePatch::new().append(GLOBAL_CHANNEL, Message::user(text)))
            .unwrap();
        Checkpoint::new("sess-1", step, state, next.map(String::from))
    }

    async fn exercise(store: &dyn Checkpointer) {
        assert!(store.load_latest("sess-1").await.unwrap().is_none());

        store.save(&checkpoint(1, "first", Some("orchestrator_agent"))).await.unwrap();
        store.save(&checkpoint(2, "second", Some("Billing_memory_agent"))).await.unwrap();
        store.save(&checkpoint(3, "third", None)).await.unwrap();

        let latest = store.load_latest("sess-1").await.unwrap().unwrap();
        assert_eq!(latest.step, 3);
        assert!(latest.next.is_none());
        assert_eq!(latest.state.channel(GLOBAL_CHANNEL)[0].content, "third");

        let history = store.history("sess-1").await.unwrap();
        assert_eq!(history.iter().map(|c| c.step).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(history[1].next.as_deref(), Some("Billing_memory_agent"));

        assert_eq!(store.prune("sess-1", 1).await.unwrap(), 2);
        assert_eq!(store.history("sess-1").await.unwrap().len(), 1);
        assert!(store.history("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_checkpointer() {
        exercise(&InMemoryCheckpointer::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_checkpointer_in_memory() {
        exercise(&SqliteCheckpointer::in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_sqlite_checkpointer_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints.db");
        {
            let store = SqliteCheckpointer::open(&path).unwrap();
            store.save(&checkpoint(7, "persisted", None)).await.unwrap();
        }
        let store = SqliteCheckpointer::open(&path).unwrap();
        let latest = store.load_latest("sess-1").await.unwrap().unwrap();
        assert_eq!(latest.step, 7);
        assert_eq!(latest.state, checkpoint(7, "persisted", None).state);
    }
}
