use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::draft::DraftId;

pub type EvaluationId = u64;

/// 一次人工评审结果，多轮修订只追加不覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub draft_id: DraftId,
    /// 对账前 Draft 的原文
    pub original_response: Option<String>,
    /// 评审者修改后的答案
    pub fine_tuned_response: Option<String>,
    pub score: Option<i64>,
    pub comments: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub draft_id: DraftId,
    pub original_response: Option<String>,
    pub fine_tuned_response: Option<String>,
    pub score: Option<i64>,
    pub comments: Option<String>,
}
