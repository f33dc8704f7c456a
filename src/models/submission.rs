//! 提交（一份上传的问卷）及其状态机

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubmissionId = u64;

/// 提交状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Uploaded,
    Processing,
    PendingReview,
    Reviewed,
    GeneratingArtifact,
    Completed,
    Failed,
}

impl SubmissionStatus {
    /// 从当前状态出发允许到达的状态
    ///
    /// `Failed` 是吸收态；除了 `Failed` 边以外不允许跳过任何状态。
    /// `PendingReview → Processing` 用于手动重跑，`Reviewed/Completed → Reviewed`
    /// 用于多轮修订。
    pub fn allowed_transitions(self) -> &'static [SubmissionStatus] {
        use SubmissionStatus::*;
        match self {
            Uploaded => &[Processing],
            Processing => &[PendingReview, Failed],
            PendingReview => &[Processing, Reviewed],
            Reviewed => &[Reviewed, GeneratingArtifact],
            GeneratingArtifact => &[Completed, Failed],
            Completed => &[Reviewed, GeneratingArtifact],
            Failed => &[],
        }
    }

    pub fn can_transition_to(self, to: SubmissionStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Uploaded => "uploaded",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::PendingReview => "pending_review",
            SubmissionStatus::Reviewed => "reviewed",
            SubmissionStatus::GeneratingArtifact => "generating_artifact",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// 用户上传时的原始文件名
    pub filename: String,
    /// 按提交 ID 命名的存储路径
    pub storage_path: Option<String>,
    pub status: SubmissionStatus,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::SubmissionStatus::*;
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Uploaded,
            Processing,
            PendingReview,
            Reviewed,
            GeneratingArtifact,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_state_is_skipped() {
        assert!(!Uploaded.can_transition_to(PendingReview));
        assert!(!Processing.can_transition_to(Reviewed));
        assert!(!PendingReview.can_transition_to(Completed));
        assert!(!Reviewed.can_transition_to(Completed));
    }

    #[test]
    fn failed_is_reachable_only_from_processing_phases_and_absorbs() {
        let reaches_failed: Vec<_> = [
            Uploaded,
            Processing,
            PendingReview,
            Reviewed,
            GeneratingArtifact,
            Completed,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(Failed))
        .collect();

        assert_eq!(reaches_failed, vec![Processing, GeneratingArtifact]);
        assert!(Failed.allowed_transitions().is_empty());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
    }
}
