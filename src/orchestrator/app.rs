//! 应用门面 - 编排层
//!
//! ## 职责
//!
//! 对外暴露全部操作（上传、生成、修订、列表、下载、交付物、查看），
//! 持有存储、文本生成、渲染和磁盘布局，并负责同一提交上的操作互斥。
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有 `DocumentStore` / `TextGenerator` 的模块
//! - **按提交加锁**：生成、对账、交付物生成在同一提交上串行执行
//! - **向下委托**：具体流程交给 `StagePipeline` 和 `ReconciliationEngine`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{DocumentStore, FileKind, FileStorage, MemoryStore};
use crate::models::{
    live_draft, Draft, EvaluationId, Item, Submission, SubmissionId, SubmissionStatus,
};
use crate::orchestrator::pipeline::{PipelineReport, StagePipeline};
use crate::orchestrator::reconciler::ReconciliationEngine;
use crate::orchestrator::state::{mark_failed, transition_submission, validate_transition};
use crate::services::{
    item_extractor, knowledge, ArtifactRenderer, ExportWriter, OpenAiGenerator, OutlineRenderer,
    TextGenerator,
};
use crate::utils::logging;
use crate::workflow::ItemFlow;

/// 存储快照文件名（位于数据目录下）
pub const STORE_FILE: &str = "store.json";

/// 生成操作的结果
#[derive(Debug)]
pub enum GenerateOutcome {
    /// 表格中没有任何题目
    NoItems,
    Processed(PipelineReport),
}

/// 单道题目的查看信息
#[derive(Debug, Clone)]
pub struct ItemDetail {
    pub item: Item,
    pub live_draft: Option<Draft>,
    pub draft_count: usize,
    pub evaluation_count: usize,
}

#[derive(Debug, Clone)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub items: Vec<ItemDetail>,
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    renderer: Arc<dyn ArtifactRenderer>,
    files: FileStorage,
    locks: StdMutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
    running: StdMutex<HashMap<SubmissionId, CancellationToken>>,
}

impl App {
    /// 初始化应用：打开数据目录下的存储快照，连接 LLM 服务
    pub async fn initialize(config: Config) -> AppResult<Self> {
        let config = config.normalized();
        logging::log_startup(&config);

        let store = MemoryStore::open(config.data_dir.join(STORE_FILE)).await?;
        let generator = OpenAiGenerator::new(&config);

        Ok(Self::new(
            config,
            Arc::new(store),
            Arc::new(generator),
            Arc::new(OutlineRenderer),
        ))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        renderer: Arc<dyn ArtifactRenderer>,
    ) -> Self {
        let config = config.normalized();
        let files = FileStorage::new(config.data_dir.clone());
        Self {
            config,
            store,
            generator,
            renderer,
            files,
            locks: StdMutex::new(HashMap::new()),
            running: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn files(&self) -> &FileStorage {
        &self.files
    }

    // ========== 上传 ==========

    /// 保存上传的问卷，文件按提交 ID 命名
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> AppResult<Submission> {
        FileStorage::check_extension(filename)?;

        let submission = self.store.create_submission(filename).await?;
        let path = self
            .files
            .save(FileKind::Original, submission.id, bytes)
            .await?;
        let submission = self
            .store
            .update_storage_path(submission.id, &path.display().to_string())
            .await?;

        info!(
            "[提交 {}] 📤 已上传 '{}' → {}",
            submission.id,
            filename,
            path.display()
        );
        Ok(submission)
    }

    // ========== 生成 ==========

    pub async fn generate(&self, id: SubmissionId) -> AppResult<GenerateOutcome> {
        self.generate_with_cancel(id, CancellationToken::new()).await
    }

    /// 提取题目（幂等）后运行完整的阶段流水线
    ///
    /// 同一提交已有生成在运行时返回 `Conflict`。
    pub async fn generate_with_cancel(
        &self,
        id: SubmissionId,
        cancel: CancellationToken,
    ) -> AppResult<GenerateOutcome> {
        let _run = self.register_run(id, &cancel)?;
        let _guard = self.lock_submission(id).await;
        self.run_generate(id, &cancel).await
    }

    /// 取消正在运行的生成，没有在运行时返回 false
    pub async fn cancel_generation(&self, id: SubmissionId) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.get(&id) {
            Some(token) => {
                warn!("[提交 {}] ⏹️ 收到取消请求", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_generate(
        &self,
        id: SubmissionId,
        cancel: &CancellationToken,
    ) -> AppResult<GenerateOutcome> {
        let submission = self.store.get_submission(id).await?;
        validate_transition(submission.status, SubmissionStatus::Processing)?;

        let corpus = knowledge::load(&self.config.knowledge_dir).await?;
        transition_submission(self.store.as_ref(), id, SubmissionStatus::Processing).await?;

        let item_count = match self.ensure_items(id).await {
            Ok(count) => count,
            Err(e) => {
                error!("[提交 {}] ❌ 题目提取失败: {}", id, e);
                mark_failed(self.store.as_ref(), id).await;
                return Err(e);
            }
        };
        if item_count == 0 {
            warn!("[提交 {}] ⚠️ 表格中没有题目", id);
            mark_failed(self.store.as_ref(), id).await;
            return Ok(GenerateOutcome::NoItems);
        }

        let flow = ItemFlow::new(
            self.store.clone(),
            self.generator.clone(),
            Arc::new(corpus),
            self.config.org_name.clone(),
            self.config.verbose_logging,
        );
        let exporter = ExportWriter::new(
            self.store.clone(),
            self.files.clone(),
            self.config.export_max_column_width,
        );
        let pipeline = StagePipeline::new(
            self.store.clone(),
            Arc::new(flow),
            exporter,
            self.config.max_concurrent_items,
        );

        match pipeline.run(id, cancel).await {
            Ok(report) => Ok(GenerateOutcome::Processed(report)),
            Err(e) => {
                error!("[提交 {}] ❌ 流水线中断: {}", id, e);
                // 已进入 PendingReview 的提交保持原状，导出表格可在下载时重建
                let status = self.store.get_submission(id).await.map(|s| s.status);
                if matches!(status, Ok(SubmissionStatus::Processing)) {
                    mark_failed(self.store.as_ref(), id).await;
                }
                Err(e)
            }
        }
    }

    /// 已有题目时跳过提取，返回题目数
    async fn ensure_items(&self, id: SubmissionId) -> AppResult<usize> {
        let existing = self.store.list_items(id).await?;
        if !existing.is_empty() {
            info!(
                "[提交 {}] 已有 {} 道题目，跳过提取",
                id,
                existing.len()
            );
            return Ok(existing.len());
        }

        let path = self.files.existing(FileKind::Original, id).await?;
        let questions = item_extractor::extract(&path).await?;
        for question in &questions {
            self.store.create_item(id, question, None).await?;
        }
        info!("[提交 {}] ✓ 提取到 {} 道题目", id, questions.len());
        Ok(questions.len())
    }

    // ========== 修订 ==========

    /// 保存修订表格并对账
    ///
    /// 新文件先以待确认文件保存，对账成功后才替换上一轮接受的修订文件；
    /// 对账失败时只丢弃待确认文件。
    pub async fn upload_revision(
        &self,
        id: SubmissionId,
        bytes: &[u8],
    ) -> AppResult<Vec<EvaluationId>> {
        let _guard = self.lock_submission(id).await;
        self.store.get_submission(id).await?;

        let pending = self.files.save_pending(FileKind::Revised, id, bytes).await?;
        let engine = ReconciliationEngine::new(self.store.clone());
        let created = match engine.reconcile(&pending, id).await {
            Ok(created) => created,
            Err(e) => {
                warn!("[提交 {}] ⚠️ 对账失败，丢弃本次修订文件: {}", id, e);
                self.files.discard_pending(FileKind::Revised, id).await;
                return Err(e);
            }
        };

        match self.files.promote_pending(FileKind::Revised, id).await {
            Ok(path) => {
                info!("[提交 {}] 修订文件已保存: {}", id, path.display());
                Ok(created)
            }
            Err(e) => {
                error!("[提交 {}] ❌ 评审已记录，但修订文件保存失败: {}", id, e);
                Err(e)
            }
        }
    }

    // ========== 查询 ==========

    /// 最新优先分页列出提交，`page` 从 0 开始
    pub async fn list(&self, page: usize, page_size: Option<usize>) -> AppResult<Vec<Submission>> {
        let size = page_size.unwrap_or(self.config.list_page_size).max(1);
        self.store.list_submissions(page * size, size).await
    }

    /// 题目、当前 Draft 和评审次数
    pub async fn show(&self, id: SubmissionId) -> AppResult<SubmissionDetail> {
        let submission = self.store.get_submission(id).await?;
        let mut items = Vec::new();
        for (item, drafts) in self.store.load_items_with_drafts(id).await? {
            let live = live_draft(&drafts).cloned();
            let mut evaluation_count = 0;
            for draft in &drafts {
                evaluation_count += self.store.list_evaluations(draft.id).await?.len();
            }
            items.push(ItemDetail {
                item,
                live_draft: live,
                draft_count: drafts.len(),
                evaluation_count,
            });
        }
        Ok(SubmissionDetail { submission, items })
    }

    /// 返回文件路径和建议的下载文件名
    ///
    /// 导出表格丢失时会按当前 Draft 重新生成。
    pub async fn download(&self, id: SubmissionId, kind: FileKind) -> AppResult<(PathBuf, String)> {
        let submission = self.store.get_submission(id).await?;

        let path = match self.files.existing(kind, id).await {
            Ok(path) => path,
            Err(_) if kind == FileKind::Export && has_drafts_phase(submission.status) => {
                info!("[提交 {}] 导出文件不存在，重新生成", id);
                ExportWriter::new(
                    self.store.clone(),
                    self.files.clone(),
                    self.config.export_max_column_width,
                )
                .write(id)
                .await?
            }
            Err(e) => return Err(e),
        };

        let name = match kind {
            FileKind::Original => submission.filename.clone(),
            _ => {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}_{}", kind, file)
            }
        };
        Ok((path, name))
    }

    // ========== 交付物 ==========

    /// 以修订表格为输入生成交付物：成功 → Completed，失败 → Failed
    pub async fn generate_artifact(&self, id: SubmissionId) -> AppResult<PathBuf> {
        let _guard = self.lock_submission(id).await;

        let submission = self.store.get_submission(id).await?;
        let revised = self.files.existing(FileKind::Revised, id).await?;
        let submission = transition_submission(
            self.store.as_ref(),
            submission.id,
            SubmissionStatus::GeneratingArtifact,
        )
        .await?;

        let out = self.files.path_for(FileKind::Artifact, id);
        let rendered = match self.files.ensure_parent(&out).await {
            Ok(()) => self.renderer.render(&submission, &revised, &out).await,
            Err(e) => Err(e),
        };

        match rendered {
            Ok(()) => {
                transition_submission(self.store.as_ref(), id, SubmissionStatus::Completed)
                    .await?;
                Ok(out)
            }
            Err(e) => {
                error!("[提交 {}] ❌ 交付物生成失败: {}", id, e);
                mark_failed(self.store.as_ref(), id).await;
                Err(e)
            }
        }
    }

    async fn lock_submission(&self, id: SubmissionId) -> SubmissionLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id).or_default().clone()
        };
        SubmissionLock {
            locks: &self.locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// 登记正在运行的生成；同一提交已登记时返回 `Conflict`
    fn register_run(&self, id: SubmissionId, cancel: &CancellationToken) -> AppResult<RunEntry<'_>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.contains_key(&id) {
            return Err(AppError::Conflict { submission_id: id });
        }
        running.insert(id, cancel.clone());
        Ok(RunEntry {
            running: &self.running,
            id,
        })
    }
}

/// 持有提交级互斥锁；释放后没有其他等待者时把锁从表中移除
struct SubmissionLock<'a> {
    locks: &'a StdMutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
    id: SubmissionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubmissionLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // 表本身持有一份引用；计数为 1 说明没有人在等这把锁
        if locks.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.id);
        }
    }
}

/// 生成运行登记，随生成的 future 一起释放（包括被中途丢弃）
struct RunEntry<'a> {
    running: &'a StdMutex<HashMap<SubmissionId, CancellationToken>>,
    id: SubmissionId,
}

impl Drop for RunEntry<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// 是否已经过了生成阶段（导出表格可以重建）
fn has_drafts_phase(status: SubmissionStatus) -> bool {
    matches!(
        status,
        SubmissionStatus::PendingReview
            | SubmissionStatus::Reviewed
            | SubmissionStatus::GeneratingArtifact
            | SubmissionStatus::Completed
    )
}
