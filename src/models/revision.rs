use super::draft::DraftId;
use super::submission::SubmissionId;

/// 一次对账要写入的全部内容，存储层在一次提交内应用
#[derive(Debug, Clone, Default)]
pub struct RevisionBatch {
    pub submission_id: SubmissionId,
    /// 表格里新出现的题目，按首次出现的顺序
    pub new_items: Vec<HumanItem>,
    /// 每个表格行一条，保持行顺序
    pub entries: Vec<RevisionEntry>,
}

/// 评审者补充的题目及其答案
#[derive(Debug, Clone)]
pub struct HumanItem {
    pub question_text: String,
    pub answer: String,
}

/// Evaluation 挂在哪个 Draft 上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionTarget {
    /// 已有题目的当前 Draft
    Draft(DraftId),
    /// `new_items` 中的下标，Draft 在同一次提交里创建
    NewItem(usize),
}

#[derive(Debug, Clone)]
pub struct RevisionEntry {
    pub target: RevisionTarget,
    pub fine_tuned_response: Option<String>,
    pub score: Option<i64>,
    pub comments: Option<String>,
}
