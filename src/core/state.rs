//! 共享会话状态与状态补丁
//!
//! ConversationState：通道名 -> 只追加的消息序列，外加 latest_memory / merchant_profile / last_message_from 三个标量。
//! 通道在构图时一次性创建，运行中不增不减；从检查点恢复时用 ensure_channels 补齐新图多出的通道。Agent 不直接修改状态，而是返回 StatePatch，由调度器在下一步之前原子地应用。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{Message, Role};

/// 全局通道：面向用户的对话记录
pub const GLOBAL_CHANNEL: &str = "messages";
/// 记忆阶段结束时写入 last_message_from 的固定值
pub const MEMORY_AGENT_SPEAKER: &str = "memory_agent";
/// 商户画像尚未加载时的占位值
pub const NO_MERCHANT_PROFILE: &str = "NA";

/// 会话共享状态（每个会话一份，检查点保存其完整快照）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    channels: BTreeMap<String, Vec<Message>>,
    pub latest_memory: String,
    pub merchant_profile: String,
    pub last_message_from: Option<String>,
}

impl ConversationState {
    /// 按给定通道名建立状态；全局通道总是存在
    pub fn with_channels<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut channels: BTreeMap<String, Vec<Message>> = names
            .into_iter()
            .map(|n| (n.into(), Vec::new()))
            .collect();
        channels.entry(GLOBAL_CHANNEL.to_string()).or_default();
        Self {
            channels,
            latest_memory: String::new(),
            merchant_profile: NO_MERCHANT_PROFILE.to_string(),
            last_message_from: None,
        }
    }

    /// 通道内容；未知通道返回空切片（通道集合在构图时已校验）
    pub fn channel(&self, name: &str) -> &[Message] {
        self.channels.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// 补齐缺失的通道（旧检查点 + 新增 topic），返回新增数量；已有通道内容不变
    pub fn ensure_channels<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.channels.len();
        for name in names {
            self.channels.entry(name.into()).or_default();
        }
        self.channels.len() - before
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn last_message(&self, channel: &str) -> Option<&Message> {
        self.channel(channel).last()
    }

    /// 全局通道中最近一条用户消息
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.channel(GLOBAL_CHANNEL)
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
    }

    pub fn last_from_memory(&self) -> bool {
        self.last_message_from.as_deref() == Some(MEMORY_AGENT_SPEAKER)
    }

    /// 原子地应用补丁：先校验所有目标通道存在，任一不存在则整体拒绝、状态不变
    pub fn apply(&mut self, patch: StatePatch) -> Result<(), AgentError> {
        for op in &patch.ops {
            if let Some(channel) = op.channel() {
                if !self.channels.contains_key(channel) {
                    return Err(AgentError::UnknownChannel(channel.to_string()));
                }
            }
        }

        for op in patch.ops {
            match op {
                PatchOp::Append { channel, messages } => {
                    if let Some(buf) = self.channels.get_mut(&channel) {
                        buf.extend(messages);
                    }
                }
                PatchOp::Clear { channel } => {
                    if let Some(buf) = self.channels.get_mut(&channel) {
                        buf.clear();
                    }
                }
                PatchOp::SetLatestMemory(text) => self.latest_memory = text,
                PatchOp::SetLastMessageFrom(name) => self.last_message_from = Some(name),
            }
        }
        Ok(())
    }
}

/// 单个补丁操作
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// 向通道追加消息
    Append { channel: String, messages: Vec<Message> },
    /// 清空通道（记忆通道是草稿区，每轮冲刷）
    Clear { channel: String },
    SetLatestMemory(String),
    SetLastMessageFrom(String),
}

impl PatchOp {
    fn channel(&self) -> Option<&str> {
        match self {
            PatchOp::Append { channel, .. } | PatchOp::Clear { channel } => Some(channel),
            _ => None,
        }
    }
}

/// 声明式状态补丁：按顺序执行的操作列表
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    ops: Vec<PatchOp>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(self, channel: impl Into<String>, message: Message) -> Self {
        self.append_all(channel, vec![message])
    }

    pub fn append_all(mut self, channel: impl Into<String>, messages: Vec<Message>) -> Self {
        if !messages.is_empty() {
            self.ops.push(PatchOp::Append {
                channel: channel.into(),
                messages,
            });
        }
        self
    }

    pub fn clear(mut self, channel: impl Into<String>) -> Self {
        self.ops.push(PatchOp::Clear {
            channel: channel.into(),
        });
        self
    }

    pub fn latest_memory(mut self, text: impl Into<String>) -> Self {
        self.ops.push(PatchOp::SetLatestMemory(text.into()));
        self
    }

    pub fn last_message_from(mut self, name: impl Into<String>) -> Self {
        self.ops.push(PatchOp::SetLastMessageFrom(name.into()));
        self
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
