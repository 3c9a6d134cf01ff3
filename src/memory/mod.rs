//! 记忆层：消息模型、检索网关、会话检查点

pub mod checkpoint;
pub mod conversation;
pub mod retrieval;

pub use checkpoint::{Checkpoint, Checkpointer, InMemoryCheckpointer, SqliteCheckpointer};
pub use conversation::{Message, Role, ToolCall};
pub use retrieval::{HttpGateway, InMemoryGateway, RetrievalGateway, SearchHit};
