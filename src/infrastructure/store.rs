//! 文档存储 - 基础设施层
//!
//! 持有唯一的可变共享资源（Submission / Item / Draft / Evaluation 记录），
//! 只暴露按实体划分的 CRUD 能力。每次写入都是一次提交；对账的全部写入
//! 通过 `apply_revision` 合并为一次提交。

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{
    Draft, DraftId, DraftStatus, Evaluation, EvaluationId, Item, ItemId, ItemStatus, NewDraft,
    NewEvaluation, RevisionBatch, RevisionTarget, Submission, SubmissionId, SubmissionStatus,
    HUMAN_MODEL_ID, HUMAN_PROVIDED_CONTEXT,
};

/// 文档存储接口
///
/// 约定：
/// - 每个写操作是一次原子提交，提交后立即可读（read-your-writes）
/// - 找不到记录时返回 `AppError::NotFound`
/// - 列表按创建顺序返回（提交列表除外，按最新优先）
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_submission(&self, filename: &str) -> AppResult<Submission>;
    async fn get_submission(&self, id: SubmissionId) -> AppResult<Submission>;
    /// 最新的提交排在前面
    async fn list_submissions(&self, offset: usize, limit: usize) -> AppResult<Vec<Submission>>;
    async fn update_storage_path(&self, id: SubmissionId, path: &str) -> AppResult<Submission>;
    async fn update_submission_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> AppResult<Submission>;

    async fn create_item(
        &self,
        submission_id: SubmissionId,
        question_text: &str,
        retrieved_context: Option<&str>,
    ) -> AppResult<Item>;
    async fn get_item(&self, id: ItemId) -> AppResult<Item>;
    async fn list_items(&self, submission_id: SubmissionId) -> AppResult<Vec<Item>>;
    async fn update_item_context(&self, id: ItemId, context: &str) -> AppResult<Item>;
    async fn update_item_status(&self, id: ItemId, status: ItemStatus) -> AppResult<Item>;

    async fn create_draft(&self, draft: NewDraft) -> AppResult<Draft>;
    async fn get_draft(&self, id: DraftId) -> AppResult<Draft>;
    /// 某题目的 Draft 历史（只追加）
    async fn list_drafts(&self, item_id: ItemId) -> AppResult<Vec<Draft>>;

    async fn create_evaluation(&self, evaluation: NewEvaluation) -> AppResult<Evaluation>;
    async fn get_evaluation(&self, id: EvaluationId) -> AppResult<Evaluation>;
    async fn list_evaluations(&self, draft_id: DraftId) -> AppResult<Vec<Evaluation>>;

    /// 一次提交内应用整张修订表格：新建人工题目及其 Draft，按行追加
    /// Evaluation，相关题目置为 Reviewed，提交置为 Reviewed。
    ///
    /// 任何一步出错都不留下任何写入。返回的 Evaluation 与 `entries` 顺序一致。
    async fn apply_revision(&self, batch: RevisionBatch) -> AppResult<Vec<Evaluation>>;

    /// 读取提交下的所有题目及各自的 Draft 历史
    async fn load_items_with_drafts(
        &self,
        submission_id: SubmissionId,
    ) -> AppResult<Vec<(Item, Vec<Draft>)>> {
        let items = self.list_items(submission_id).await?;
        let mut loaded = Vec::with_capacity(items.len());
        for item in items {
            let drafts = self.list_drafts(item.id).await?;
            loaded.push((item, drafts));
        }
        Ok(loaded)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    last_id: u64,
    submissions: BTreeMap<SubmissionId, Submission>,
    items: BTreeMap<ItemId, Item>,
    drafts: BTreeMap<DraftId, Draft>,
    evaluations: BTreeMap<EvaluationId, Evaluation>,
}

impl StoreState {
    // 所有实体共用一个递增序列，ID 同时代表创建顺序
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn submission_mut(&mut self, id: SubmissionId) -> AppResult<&mut Submission> {
        self.submissions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("submission", id))
    }

    fn item_mut(&mut self, id: ItemId) -> AppResult<&mut Item> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("item", id))
    }
}

/// 内存存储，可选地在每次提交后把快照写入 JSON 文件
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// 纯内存存储（测试使用）
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
        }
    }

    /// 打开带快照文件的存储；文件不存在时从空状态开始
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let state = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| load_failed(&path, e))?;
            let state: StoreState =
                serde_json::from_slice(&bytes).map_err(|e| load_failed(&path, e))?;
            info!(
                "✓ 已加载存储快照: {} 个提交, {} 道题目",
                state.submissions.len(),
                state.items.len()
            );
            state
        } else {
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// 执行一次提交：在副本上修改 → 持久化 → 替换；任一步出错则副本整体丢弃
    async fn commit<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.snapshot_path {
            persist(path, &next).await?;
        }
        *guard = next;
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn persist(path: &Path, state: &StoreState) -> AppResult<()> {
    let bytes = serde_json::to_vec_pretty(state).map_err(|e| persist_failed(path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| persist_failed(path, e))?;
    }
    // 先写临时文件再改名，避免留下写了一半的快照
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| persist_failed(path, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| persist_failed(path, e))?;
    debug!("存储快照已写入 {}", path.display());
    Ok(())
}

fn persist_failed(path: &Path, e: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Store(StoreError::PersistFailed {
        path: path.display().to_string(),
        source: Box::new(e),
    })
}

fn load_failed(path: &Path, e: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Store(StoreError::LoadFailed {
        path: path.display().to_string(),
        source: Box::new(e),
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_submission(&self, filename: &str) -> AppResult<Submission> {
        self.commit(|state| {
            let submission = Submission {
                id: state.next_id(),
                filename: filename.to_string(),
                storage_path: None,
                status: SubmissionStatus::Uploaded,
                uploaded_at: Utc::now(),
                updated_at: None,
            };
            state.submissions.insert(submission.id, submission.clone());
            Ok(submission)
        })
        .await
    }

    async fn get_submission(&self, id: SubmissionId) -> AppResult<Submission> {
        self.state
            .read()
            .await
            .submissions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("submission", id))
    }

    async fn list_submissions(&self, offset: usize, limit: usize) -> AppResult<Vec<Submission>> {
        let state = self.state.read().await;
        Ok(state
            .submissions
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_storage_path(&self, id: SubmissionId, path: &str) -> AppResult<Submission> {
        self.commit(|state| {
            let submission = state.submission_mut(id)?;
            submission.storage_path = Some(path.to_string());
            submission.updated_at = Some(Utc::now());
            Ok(submission.clone())
        })
        .await
    }

    async fn update_submission_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> AppResult<Submission> {
        self.commit(|state| {
            let submission = state.submission_mut(id)?;
            submission.status = status;
            submission.updated_at = Some(Utc::now());
            Ok(submission.clone())
        })
        .await
    }

    async fn create_item(
        &self,
        submission_id: SubmissionId,
        question_text: &str,
        retrieved_context: Option<&str>,
    ) -> AppResult<Item> {
        self.commit(|state| {
            if !state.submissions.contains_key(&submission_id) {
                return Err(AppError::not_found("submission", submission_id));
            }
            let item = Item {
                id: state.next_id(),
                submission_id,
                question_text: question_text.to_string(),
                retrieved_context: retrieved_context.map(str::to_string),
                page_number: None,
                status: ItemStatus::Extracted,
                extracted_at: Utc::now(),
                updated_at: None,
            };
            state.items.insert(item.id, item.clone());
            Ok(item)
        })
        .await
    }

    async fn get_item(&self, id: ItemId) -> AppResult<Item> {
        self.state
            .read()
            .await
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("item", id))
    }

    async fn list_items(&self, submission_id: SubmissionId) -> AppResult<Vec<Item>> {
        let state = self.state.read().await;
        if !state.submissions.contains_key(&submission_id) {
            return Err(AppError::not_found("submission", submission_id));
        }
        Ok(state
            .items
            .values()
            .filter(|item| item.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn update_item_context(&self, id: ItemId, context: &str) -> AppResult<Item> {
        self.commit(|state| {
            let item = state.item_mut(id)?;
            item.retrieved_context = Some(context.to_string());
            item.updated_at = Some(Utc::now());
            Ok(item.clone())
        })
        .await
    }

    async fn update_item_status(&self, id: ItemId, status: ItemStatus) -> AppResult<Item> {
        self.commit(|state| {
            let item = state.item_mut(id)?;
            item.status = status;
            item.updated_at = Some(Utc::now());
            Ok(item.clone())
        })
        .await
    }

    async fn create_draft(&self, draft: NewDraft) -> AppResult<Draft> {
        self.commit(|state| {
            if !state.items.contains_key(&draft.item_id) {
                return Err(AppError::not_found("item", draft.item_id));
            }
            let draft = Draft {
                id: state.next_id(),
                item_id: draft.item_id,
                model_id: draft.model_id,
                retrieved_context_snapshot: draft.retrieved_context_snapshot,
                response_text: draft.response_text,
                status: draft.status,
                generated_at: Utc::now(),
            };
            state.drafts.insert(draft.id, draft.clone());
            Ok(draft)
        })
        .await
    }

    async fn get_draft(&self, id: DraftId) -> AppResult<Draft> {
        self.state
            .read()
            .await
            .drafts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("draft", id))
    }

    async fn list_drafts(&self, item_id: ItemId) -> AppResult<Vec<Draft>> {
        let state = self.state.read().await;
        Ok(state
            .drafts
            .values()
            .filter(|d| d.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn create_evaluation(&self, evaluation: NewEvaluation) -> AppResult<Evaluation> {
        self.commit(|state| {
            if !state.drafts.contains_key(&evaluation.draft_id) {
                return Err(AppError::not_found("draft", evaluation.draft_id));
            }
            let evaluation = Evaluation {
                id: state.next_id(),
                draft_id: evaluation.draft_id,
                original_response: evaluation.original_response,
                fine_tuned_response: evaluation.fine_tuned_response,
                score: evaluation.score,
                comments: evaluation.comments,
                evaluated_at: Utc::now(),
            };
            state.evaluations.insert(evaluation.id, evaluation.clone());
            Ok(evaluation)
        })
        .await
    }

    async fn get_evaluation(&self, id: EvaluationId) -> AppResult<Evaluation> {
        self.state
            .read()
            .await
            .evaluations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("evaluation", id))
    }

    async fn list_evaluations(&self, draft_id: DraftId) -> AppResult<Vec<Evaluation>> {
        let state = self.state.read().await;
        Ok(state
            .evaluations
            .values()
            .filter(|e| e.draft_id == draft_id)
            .cloned()
            .collect())
    }

    async fn apply_revision(&self, batch: RevisionBatch) -> AppResult<Vec<Evaluation>> {
        self.commit(move |state| {
            let submission_id = batch.submission_id;
            let from = state.submission_mut(submission_id)?.status;
            if !from.can_transition_to(SubmissionStatus::Reviewed) {
                return Err(AppError::IllegalTransition {
                    from: from.to_string(),
                    to: SubmissionStatus::Reviewed.to_string(),
                });
            }
            let now = Utc::now();

            let mut human_drafts = Vec::with_capacity(batch.new_items.len());
            for human in batch.new_items {
                let item = Item {
                    id: state.next_id(),
                    submission_id,
                    question_text: human.question_text,
                    retrieved_context: Some(HUMAN_PROVIDED_CONTEXT.to_string()),
                    page_number: None,
                    status: ItemStatus::Extracted,
                    extracted_at: now,
                    updated_at: None,
                };
                let draft = Draft {
                    id: state.next_id(),
                    item_id: item.id,
                    model_id: HUMAN_MODEL_ID.to_string(),
                    retrieved_context_snapshot: Some(HUMAN_PROVIDED_CONTEXT.to_string()),
                    response_text: human.answer,
                    status: DraftStatus::InitialDraft,
                    generated_at: now,
                };
                human_drafts.push(draft.id);
                state.items.insert(item.id, item);
                state.drafts.insert(draft.id, draft);
            }

            let mut created = Vec::with_capacity(batch.entries.len());
            for entry in batch.entries {
                let draft_id = match entry.target {
                    RevisionTarget::Draft(id) => id,
                    RevisionTarget::NewItem(idx) => *human_drafts
                        .get(idx)
                        .ok_or_else(|| AppError::not_found("revision item", idx as u64))?,
                };
                let draft = state
                    .drafts
                    .get(&draft_id)
                    .cloned()
                    .ok_or_else(|| AppError::not_found("draft", draft_id))?;
                let item = state.item_mut(draft.item_id)?;
                if item.submission_id != submission_id {
                    return Err(AppError::not_found("draft", draft_id));
                }
                item.status = ItemStatus::Reviewed;
                item.updated_at = Some(now);

                let evaluation = Evaluation {
                    id: state.next_id(),
                    draft_id,
                    original_response: Some(draft.response_text),
                    fine_tuned_response: entry.fine_tuned_response,
                    score: entry.score,
                    comments: entry.comments,
                    evaluated_at: now,
                };
                state.evaluations.insert(evaluation.id, evaluation.clone());
                created.push(evaluation);
            }

            let submission = state.submission_mut(submission_id)?;
            submission.status = SubmissionStatus::Reviewed;
            submission.updated_at = Some(now);
            Ok(created)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HumanItem, RevisionEntry};

    fn new_draft(item_id: ItemId, text: &str) -> NewDraft {
        NewDraft {
            item_id,
            model_id: "test-model".to_string(),
            retrieved_context_snapshot: None,
            response_text: text.to_string(),
            status: DraftStatus::InitialDraft,
        }
    }

    #[tokio::test]
    async fn submissions_list_newest_first_with_paging() {
        let store = MemoryStore::new();
        for name in ["a.xlsx", "b.xlsx", "c.xlsx"] {
            store.create_submission(name).await.unwrap();
        }

        let first_page = store.list_submissions(0, 2).await.unwrap();
        let names: Vec<_> = first_page.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["c.xlsx", "b.xlsx"]);

        let second_page = store.list_submissions(2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].filename, "a.xlsx");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_submission(42).await,
            Err(AppError::NotFound { entity: "submission", id: 42 })
        ));
        assert!(matches!(
            store.create_item(42, "q", None).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            store.create_draft(new_draft(9, "x")).await,
            Err(AppError::NotFound { entity: "item", .. })
        ));
    }

    #[tokio::test]
    async fn draft_history_is_append_only() {
        let store = MemoryStore::new();
        let submission = store.create_submission("s.xlsx").await.unwrap();
        let item = store.create_item(submission.id, "q", None).await.unwrap();

        store.create_draft(new_draft(item.id, "first")).await.unwrap();
        store.create_draft(new_draft(item.id, "second")).await.unwrap();

        let history = store.list_drafts(item.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            crate::models::live_draft(&history).unwrap().response_text,
            "second"
        );
    }

    async fn pending_review_with_draft(store: &MemoryStore) -> (SubmissionId, Item, Draft) {
        let submission = store.create_submission("s.xlsx").await.unwrap();
        let item = store.create_item(submission.id, "Q1", Some("ctx")).await.unwrap();
        let draft = store.create_draft(new_draft(item.id, "machine")).await.unwrap();
        store
            .update_submission_status(submission.id, SubmissionStatus::PendingReview)
            .await
            .unwrap();
        (submission.id, item, draft)
    }

    fn entry(target: RevisionTarget) -> RevisionEntry {
        RevisionEntry {
            target,
            fine_tuned_response: Some("edited".to_string()),
            score: Some(4),
            comments: None,
        }
    }

    #[tokio::test]
    async fn revision_batch_applies_in_one_commit() {
        let store = MemoryStore::new();
        let (id, item, draft) = pending_review_with_draft(&store).await;

        let created = store
            .apply_revision(RevisionBatch {
                submission_id: id,
                new_items: vec![HumanItem {
                    question_text: "NEW".to_string(),
                    answer: "typed by hand".to_string(),
                }],
                entries: vec![
                    entry(RevisionTarget::Draft(draft.id)),
                    entry(RevisionTarget::NewItem(0)),
                ],
            })
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].original_response.as_deref(), Some("machine"));
        assert_eq!(created[1].original_response.as_deref(), Some("typed by hand"));

        let items = store.list_items(id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == ItemStatus::Reviewed));
        assert_eq!(items[1].retrieved_context.as_deref(), Some(HUMAN_PROVIDED_CONTEXT));
        assert_eq!(store.get_item(item.id).await.unwrap().status, ItemStatus::Reviewed);
        assert_eq!(
            store.get_submission(id).await.unwrap().status,
            SubmissionStatus::Reviewed
        );
    }

    #[tokio::test]
    async fn failing_revision_batch_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let (id, item, draft) = pending_review_with_draft(&store).await;

        // 第二行指向不存在的 Draft，此前的新题目和第一条评审都不能留下
        let err = store
            .apply_revision(RevisionBatch {
                submission_id: id,
                new_items: vec![HumanItem {
                    question_text: "NEW".to_string(),
                    answer: String::new(),
                }],
                entries: vec![
                    entry(RevisionTarget::Draft(draft.id)),
                    entry(RevisionTarget::Draft(9_999)),
                    entry(RevisionTarget::NewItem(0)),
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "draft", id: 9_999 }));

        assert_eq!(store.list_items(id).await.unwrap().len(), 1);
        assert_eq!(store.get_item(item.id).await.unwrap().status, ItemStatus::Extracted);
        assert!(store.list_evaluations(draft.id).await.unwrap().is_empty());
        assert_eq!(
            store.get_submission(id).await.unwrap().status,
            SubmissionStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn revision_batch_needs_a_reviewable_submission() {
        let store = MemoryStore::new();
        let submission = store.create_submission("s.xlsx").await.unwrap();

        let err = store
            .apply_revision(RevisionBatch {
                submission_id: submission.id,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_the_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("db");
        let store = MemoryStore::open(db_dir.join("store.json")).await.unwrap();
        let (id, _item, draft) = pending_review_with_draft(&store).await;

        // 快照目录被普通文件占位，持久化必然失败
        std::fs::remove_dir_all(&db_dir).unwrap();
        std::fs::write(&db_dir, b"").unwrap();

        let err = store
            .apply_revision(RevisionBatch {
                submission_id: id,
                new_items: vec![HumanItem {
                    question_text: "NEW".to_string(),
                    answer: String::new(),
                }],
                entries: vec![
                    entry(RevisionTarget::Draft(draft.id)),
                    entry(RevisionTarget::NewItem(0)),
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::PersistFailed { .. })));

        assert_eq!(store.list_items(id).await.unwrap().len(), 1);
        assert!(store.list_evaluations(draft.id).await.unwrap().is_empty());
        assert_eq!(
            store.get_submission(id).await.unwrap().status,
            SubmissionStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let submission_id = {
            let store = MemoryStore::open(&path).await.unwrap();
            let submission = store.create_submission("rfp.xlsx").await.unwrap();
            store
                .create_item(submission.id, "Describe your SLAs.", None)
                .await
                .unwrap();
            submission.id
        };

        let reopened = MemoryStore::open(&path).await.unwrap();
        let items = reopened.list_items(submission_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question_text, "Describe your SLAs.");

        // 新记录的 ID 继续递增
        let next = reopened.create_submission("next.xlsx").await.unwrap();
        assert!(next.id > items[0].id);
    }
}
