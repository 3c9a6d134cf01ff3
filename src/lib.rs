//! Hive - 多 Agent 客服路由框架
//!
//! 模块划分：
//! - **agents**: Agent 配置树、提示词模板，以及 planner / executor / memory / orchestrator 的单步逻辑
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、共享会话状态与状态补丁
//! - **graph**: 构图与调度引擎（每步写检查点）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）及决策 Oracle
//! - **memory**: 消息模型、检索网关、检查点存储
//! - **observability**: 日志初始化
//! - **runtime**: 按会话的回合 API
//! - **tools**: 工具 trait、注册表、执行器与知识库工具

pub mod agents;
pub mod config;
pub mod core;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod runtime;
pub mod tools;

pub use runtime::HiveRuntime;
