use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::ItemId;

pub type DraftId = u64;

/// 人工补充题目时记录的模型标识
pub const HUMAN_MODEL_ID: &str = "human";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    InitialDraft,
    Revised,
}

/// 某道题目在某一时刻的机器答案，创建后内容不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub item_id: ItemId,
    pub model_id: String,
    pub retrieved_context_snapshot: Option<String>,
    pub response_text: String,
    pub status: DraftStatus,
    pub generated_at: DateTime<Utc>,
}

/// 新建 Draft 所需字段
#[derive(Debug, Clone)]
pub struct NewDraft {
    pub item_id: ItemId,
    pub model_id: String,
    pub retrieved_context_snapshot: Option<String>,
    pub response_text: String,
    pub status: DraftStatus,
}

/// 当前有效的 Draft：按创建顺序取最后一个
///
/// `history` 是只追加的序列，ID 单调递增，因此以 ID 为准。
pub fn live_draft(history: &[Draft]) -> Option<&Draft> {
    history.iter().max_by_key(|d| d.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: DraftId, text: &str) -> Draft {
        Draft {
            id,
            item_id: 1,
            model_id: "m".to_string(),
            retrieved_context_snapshot: None,
            response_text: text.to_string(),
            status: DraftStatus::InitialDraft,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn latest_draft_wins_regardless_of_slice_order() {
        let history = vec![draft(7, "newest"), draft(2, "old"), draft(5, "middle")];
        assert_eq!(live_draft(&history).unwrap().response_text, "newest");
    }

    #[test]
    fn no_history_means_no_live_draft() {
        assert!(live_draft(&[]).is_none());
    }
}
