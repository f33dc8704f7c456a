//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责并发调度、状态推进和对账，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用门面
//! - 持有存储、文本生成、渲染和磁盘布局
//! - 上传 / 生成 / 修订 / 列表 / 下载 / 交付物
//! - 同一提交上的操作互斥，生成可取消
//!
//! ### `pipeline` - 阶段流水线
//! - 每道题一个任务（Semaphore 限流），等全部结束再推进状态
//! - 汇总单题失败，导出评审表格
//!
//! ### `reconciler` - 对账引擎
//! - 校验修订表格，按规范化题目匹配 Draft，追加 Evaluation
//!
//! ### `state` - 提交状态迁移
//!
//! ## 层次关系
//!
//! ```text
//! app (处理一个提交的一次操作)
//!     ↓
//! pipeline / reconciler
//!     ↓
//! workflow::ItemFlow (处理单个 Item)
//!     ↓
//! services (能力层：sheet / knowledge / llm / export)
//!     ↓
//! infrastructure (基础设施：DocumentStore / FileStorage)
//! ```

pub mod app;
pub mod pipeline;
pub mod reconciler;
pub mod state;

// 重新导出主要类型
pub use app::{App, GenerateOutcome, ItemDetail, SubmissionDetail};
pub use pipeline::{ItemFailure, PipelineReport, StagePipeline};
pub use reconciler::ReconciliationEngine;
