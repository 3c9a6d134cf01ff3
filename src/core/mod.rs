//! 核心层：错误类型、共享会话状态与状态补丁

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{
    ConversationState, PatchOp, StatePatch, GLOBAL_CHANNEL, MEMORY_AGENT_SPEAKER,
    NO_MERCHANT_PROFILE,
};
