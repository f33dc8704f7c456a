//! 提交状态迁移
//!
//! 所有对 `Submission.status` 的修改都经过这里，非法迁移直接拒绝。

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::DocumentStore;
use crate::models::{Submission, SubmissionId, SubmissionStatus};

/// 校验迁移是否合法（不落库）
pub fn validate_transition(from: SubmissionStatus, to: SubmissionStatus) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// 读取当前状态，校验后写入新状态
pub async fn transition_submission(
    store: &dyn DocumentStore,
    id: SubmissionId,
    to: SubmissionStatus,
) -> AppResult<Submission> {
    let current = store.get_submission(id).await?;
    validate_transition(current.status, to)?;

    let updated = store.update_submission_status(id, to).await?;
    info!("[提交 {}] 状态: {} → {}", id, current.status, to);
    Ok(updated)
}

/// 不可恢复的错误：尽量把提交标记为 Failed，失败本身只记日志
pub async fn mark_failed(store: &dyn DocumentStore, id: SubmissionId) {
    if let Err(e) = transition_submission(store, id, SubmissionStatus::Failed).await {
        tracing::error!("[提交 {}] ❌ 无法标记为失败: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryStore;

    #[tokio::test]
    async fn legal_transition_is_persisted() {
        let store = MemoryStore::new();
        let sub = store.create_submission("a.xlsx").await.unwrap();

        let updated = transition_submission(&store, sub.id, SubmissionStatus::Processing)
            .await
            .unwrap();
        assert_eq!(updated.status, SubmissionStatus::Processing);
    }

    #[tokio::test]
    async fn skipping_a_state_is_rejected() {
        let store = MemoryStore::new();
        let sub = store.create_submission("a.xlsx").await.unwrap();

        let err = transition_submission(&store, sub.id, SubmissionStatus::Reviewed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition { .. }));
        assert_eq!(
            store.get_submission(sub.id).await.unwrap().status,
            SubmissionStatus::Uploaded
        );
    }

    #[tokio::test]
    async fn failed_is_absorbing() {
        let store = MemoryStore::new();
        let sub = store.create_submission("a.xlsx").await.unwrap();
        transition_submission(&store, sub.id, SubmissionStatus::Processing)
            .await
            .unwrap();
        mark_failed(&store, sub.id).await;

        assert!(transition_submission(&store, sub.id, SubmissionStatus::Processing)
            .await
            .is_err());
    }
}
