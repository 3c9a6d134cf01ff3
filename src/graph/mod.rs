//! 图层：节点类型、构图与调度引擎

pub mod builder;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod engine;
pub mod types;

pub use builder::GraphBuilder;
pub use engine::{final_reply, GraphEngine, TurnOutcome};
pub use graph::{AgentGraph, AgentNode};
pub use types::{Goto, NodeId, Step};
