//! # RFP Responder
//!
//! 把一份采购问卷表格变成草拟答案，交给人工离线修订，再把修订结果对账回存储。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享资源，只暴露能力
//! - `DocumentStore` - 按实体划分的记录存储（`MemoryStore` + JSON 快照）
//! - `FileStorage` - 按提交 ID 命名的磁盘布局
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `sheet` / `item_extractor` / `export_writer` - 表格读写、题目提取、导出
//! - `knowledge` - 知识库语料加载
//! - `TextGenerator` - 文本生成能力（`OpenAiGenerator`）
//! - `ArtifactRenderer` - 交付物渲染
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `ItemCtx` - 上下文封装（submission_id + item_id）
//! - `ItemFlow` - retrieve → contextualize
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 有界并发的扇出/扇入
//! - `orchestrator/reconciler` - 修订表格对账
//! - `orchestrator/app` - 应用门面，管理资源、互斥和取消
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{DocumentStore, FileKind, FileStorage, MemoryStore};
pub use models::{Draft, Evaluation, Item, Submission, SubmissionStatus};
pub use orchestrator::{App, GenerateOutcome, PipelineReport, ReconciliationEngine};
pub use services::TextGenerator;
pub use workflow::{ItemCtx, ItemFlow};
