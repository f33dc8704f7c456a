//! 阶段流水线 - 编排层
//!
//! ## 职责
//!
//! 把一个提交的全部题目并发地送进 `ItemFlow`（先 retrieve 再 contextualize），
//! 等所有题目都结束后再推进提交状态并导出表格。
//!
//! ## 设计特点
//!
//! - **有界并发**：Semaphore 限制同时处理的题目数，与题目总数无关
//! - **失败隔离**：单题失败只记录在报告里，不影响其他题目，也不会让提交失败
//! - **可取消**：取消后尚未开始的题目标记为 Skipped，提交标记为 Failed，不导出

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::AppResult;
use crate::infrastructure::DocumentStore;
use crate::models::{DraftId, Item, ItemId, ItemStatus, SubmissionId, SubmissionStatus};
use crate::orchestrator::state::{mark_failed, transition_submission};
use crate::services::ExportWriter;
use crate::utils::logging;
use crate::workflow::{ItemCtx, ItemFlow, Stage, StageFailure};

/// 单题失败记录
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub item_id: ItemId,
    /// 任务异常退出时为 None
    pub stage: Option<Stage>,
    pub message: String,
}

impl From<StageFailure> for ItemFailure {
    fn from(f: StageFailure) -> Self {
        Self {
            item_id: f.item_id,
            stage: Some(f.stage),
            message: f.error.to_string(),
        }
    }
}

/// 一次流水线运行的汇总
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub submission_id: SubmissionId,
    pub total: usize,
    /// (题目, 新建的 Draft)
    pub drafted: Vec<(ItemId, DraftId)>,
    pub failures: Vec<ItemFailure>,
    /// 因取消而没有开始的题目
    pub skipped: Vec<ItemId>,
    pub cancelled: bool,
    pub export_path: Option<PathBuf>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> usize {
        self.drafted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && !self.cancelled
    }
}

enum UnitOutcome {
    Drafted(ItemId, DraftId),
    Failed(ItemFailure),
    NotStarted(ItemId),
}

pub struct StagePipeline {
    store: Arc<dyn DocumentStore>,
    flow: Arc<ItemFlow>,
    exporter: ExportWriter,
    max_concurrent_items: usize,
}

impl StagePipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        flow: Arc<ItemFlow>,
        exporter: ExportWriter,
        max_concurrent_items: usize,
    ) -> Self {
        Self {
            store,
            flow,
            exporter,
            max_concurrent_items: max_concurrent_items.max(1),
        }
    }

    /// 处理提交下的全部题目
    ///
    /// 调用方负责先把提交置为 `Processing`。
    pub async fn run(
        &self,
        submission_id: SubmissionId,
        cancel: &CancellationToken,
    ) -> AppResult<PipelineReport> {
        let items = self.store.list_items(submission_id).await?;
        let total = items.len();
        logging::log_pipeline_start(submission_id, total, self.max_concurrent_items);

        let outcomes = self.fan_out(submission_id, items, cancel).await;

        let mut report = PipelineReport {
            submission_id,
            total,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Drafted(item_id, draft_id) => report.drafted.push((item_id, draft_id)),
                UnitOutcome::Failed(failure) => report.failures.push(failure),
                UnitOutcome::NotStarted(item_id) => report.skipped.push(item_id),
            }
        }

        for item_id in &report.skipped {
            self.store
                .update_item_status(*item_id, ItemStatus::Skipped)
                .await?;
        }

        if cancel.is_cancelled() {
            warn!(
                "[提交 {}] ⚠️ 处理已取消: {} 题完成, {} 题未开始",
                submission_id,
                report.succeeded(),
                report.skipped.len()
            );
            report.cancelled = true;
            mark_failed(self.store.as_ref(), submission_id).await;
            return Ok(report);
        }

        transition_submission(
            self.store.as_ref(),
            submission_id,
            SubmissionStatus::PendingReview,
        )
        .await?;
        report.export_path = Some(self.exporter.write(submission_id).await?);

        logging::log_pipeline_complete(&report);
        Ok(report)
    }

    async fn fan_out(
        &self,
        submission_id: SubmissionId,
        items: Vec<Item>,
        cancel: &CancellationToken,
    ) -> Vec<UnitOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_items));
        let total = items.len();
        let mut handles = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);

        for (idx, item) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcomes.push(UnitOutcome::NotStarted(item.id));
                continue;
            };

            let item_id = item.id;
            let ctx = ItemCtx::new(submission_id, item_id, idx + 1, total);
            let flow = self.flow.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match flow.run(&item, &ctx, &cancel).await {
                    Ok(draft) => UnitOutcome::Drafted(item.id, draft.id),
                    Err(failure) if failure.is_cancelled() => {
                        warn!("{} ⚠️ 已取消 ({} 阶段)", ctx, failure.stage);
                        UnitOutcome::Failed(failure.into())
                    }
                    Err(failure) => {
                        error!("{} ❌ {}", ctx, failure);
                        UnitOutcome::Failed(failure.into())
                    }
                }
            });
            handles.push((item_id, handle));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (item_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("[提交 {}] 题目 {} 任务执行失败: {}", submission_id, item_id, e);
                    outcomes.push(UnitOutcome::Failed(ItemFailure {
                        item_id,
                        stage: None,
                        message: e.to_string(),
                    }));
                }
            }
        }

        outcomes
    }
}
