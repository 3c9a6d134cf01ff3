//! 图调度的基本类型
//!
//! 每个节点执行一步后返回 Step：一份声明式状态补丁 + 一个具名的控制转移目标。

use serde::{Deserialize, Serialize};

use crate::core::StatePatch;

pub type NodeId = String;

/// 控制转移目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goto {
    /// 转到具名节点
    Node(NodeId),
    /// 进入某个 Topic 子图（其入口为该 Topic 的记忆 Agent）
    Subgraph(String),
    /// 回合结束
    End,
}

/// 单步结果
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub patch: StatePatch,
    pub goto: Goto,
}

impl Step {
    pub fn new(patch: StatePatch, goto: Goto) -> Self {
        Self { patch, goto }
    }

    /// 不修改状态的纯转移
    pub fn goto(goto: Goto) -> Self {
        Self {
            patch: StatePatch::new(),
            goto,
        }
    }
}
