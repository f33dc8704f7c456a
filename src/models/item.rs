use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::submission::SubmissionId;

pub type ItemId = u64;

/// 修订时新增题目所使用的上下文标记
pub const HUMAN_PROVIDED_CONTEXT: &str = "N/A — human provided";

/// 题目状态（粗粒度，中间阶段只体现在日志里）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Extracted,
    Reviewed,
    Skipped,
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Extracted => "extracted",
            ItemStatus::Reviewed => "reviewed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 从提交中提取出的一道题目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub submission_id: SubmissionId,
    /// 创建后不可变
    pub question_text: String,
    /// 第一阶段写入的检索结果
    pub retrieved_context: Option<String>,
    pub page_number: Option<u32>,
    pub status: ItemStatus,
    pub extracted_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 匹配用的题目键：去掉首尾空白并转小写
pub fn normalize_question(text: &str) -> String {
    text.trim().to_lowercase()
}
