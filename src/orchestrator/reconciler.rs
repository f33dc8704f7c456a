//! 对账引擎 - 编排层
//!
//! 把评审者修订过的表格合并回存储：按规范化题目文本匹配已有 Draft，
//! 匹配不上的行视为新题目，每一行都追加一条 Evaluation。Draft 本身从不修改。
//!
//! 处理分两遍：先解析并校验全部行，再把整张表作为一批写入交给存储，
//! 一次提交完成。表格有问题或写入失败时什么都不会留下。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppResult, InputError};
use crate::infrastructure::DocumentStore;
use crate::models::{
    live_draft, normalize_question, DraftId, EvaluationId, HumanItem, RevisionBatch,
    RevisionEntry, RevisionTarget, SubmissionId, SubmissionStatus,
};
use crate::orchestrator::state::validate_transition;
use crate::services::sheet::{self, Cell, Table};

/// 修订表格必须包含的列（去空白、转小写后比较）
pub const REVISION_COLUMNS: [&str; 4] = ["questions", "answers", "ratings", "comments"];

fn header_key(header: &str) -> String {
    header.trim().to_lowercase()
}

/// 校验通过的一行
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRow {
    /// 表格中的行号（表头为第 1 行）
    pub row: usize,
    pub question: String,
    pub answer: Option<String>,
    pub score: Option<i64>,
    pub comments: Option<String>,
}

/// 解析并校验整张修订表格
pub fn parse_revision(table: &Table) -> AppResult<Vec<RevisionRow>> {
    let mut columns = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for name in REVISION_COLUMNS {
        match table.find_column(name, header_key) {
            Some(idx) => {
                columns.insert(name, idx);
            }
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        missing.sort();
        return Err(InputError::MissingColumns { missing }.into());
    }

    let (q, a, r, c) = (
        columns["questions"],
        columns["answers"],
        columns["ratings"],
        columns["comments"],
    );

    let mut rows = Vec::with_capacity(table.rows.len());
    for idx in 0..table.rows.len() {
        let row = idx + 2;
        let question = table.cell(idx, q).as_text().ok_or_else(|| InputError::RowValidation {
            row,
            column: "questions".to_string(),
            value: String::new(),
            reason: "题目不能为空".to_string(),
        })?;

        rows.push(RevisionRow {
            row,
            question: question.trim().to_string(),
            answer: table.cell(idx, a).as_text(),
            score: parse_rating(row, table.cell(idx, r))?,
            comments: table.cell(idx, c).as_text(),
        });
    }
    Ok(rows)
}

/// 评分：空为 None，否则必须是整数
fn parse_rating(row: usize, cell: &Cell) -> AppResult<Option<i64>> {
    let invalid = |value: String| InputError::RowValidation {
        row,
        column: "ratings".to_string(),
        value,
        reason: "评分必须是整数".to_string(),
    };

    match cell {
        Cell::Empty => Ok(None),
        Cell::Int(i) => Ok(Some(*i)),
        Cell::Float(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Cell::Text(s) if s.trim().is_empty() => Ok(None),
        Cell::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(s.clone()).into()),
        other => Err(invalid(other.as_text().unwrap_or_default()).into()),
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn DocumentStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 对账，返回新建的 Evaluation ID（按表格行顺序）
    ///
    /// 全部写入在存储的一次提交中完成，失败时存储保持原样。
    pub async fn reconcile(
        &self,
        path: &Path,
        submission_id: SubmissionId,
    ) -> AppResult<Vec<EvaluationId>> {
        let submission = self.store.get_submission(submission_id).await?;
        validate_transition(submission.status, SubmissionStatus::Reviewed)?;

        let table = sheet::read_table(path).await?;
        let rows = parse_revision(&table)?;
        info!(
            "[提交 {}] 📥 修订表格共 {} 行，开始对账",
            submission_id,
            rows.len()
        );

        let lookup = self.build_lookup(submission_id).await?;
        let batch = plan_revision(submission_id, &rows, &lookup);
        for (row, entry) in rows.iter().zip(&batch.entries) {
            if let RevisionTarget::NewItem(idx) = entry.target {
                debug!(
                    "[提交 {}] 第 {} 行是新题目（新题目 {}）",
                    submission_id,
                    row.row,
                    idx + 1
                );
            }
        }
        let new_items = batch.new_items.len();

        let created = self.store.apply_revision(batch).await?;
        for (row, evaluation) in rows.iter().zip(&created) {
            debug!(
                "[提交 {}] 第 {} 行 → Draft #{} → Evaluation #{}",
                submission_id, row.row, evaluation.draft_id, evaluation.id
            );
        }

        info!(
            "[提交 {}] 状态: {} → {}",
            submission_id,
            submission.status,
            SubmissionStatus::Reviewed
        );
        info!(
            "[提交 {}] ✓ 对账完成: {} 条评审, {} 道新题目",
            submission_id,
            created.len(),
            new_items
        );
        Ok(created.into_iter().map(|e| e.id).collect())
    }

    /// 规范化题目 → 当前 Draft；文本相同的题目只保留最后一个
    async fn build_lookup(&self, submission_id: SubmissionId) -> AppResult<HashMap<String, DraftId>> {
        let loaded = self.store.load_items_with_drafts(submission_id).await?;
        let mut lookup = HashMap::with_capacity(loaded.len());
        for (item, drafts) in &loaded {
            if let Some(draft) = live_draft(drafts) {
                lookup.insert(normalize_question(&item.question_text), draft.id);
            }
        }
        Ok(lookup)
    }
}

/// 把校验过的行映射到目标 Draft
///
/// 匹配不上的题目只新建一次，同一文本的后续行挂到同一个新题目上。
pub fn plan_revision(
    submission_id: SubmissionId,
    rows: &[RevisionRow],
    lookup: &HashMap<String, DraftId>,
) -> RevisionBatch {
    let mut batch = RevisionBatch {
        submission_id,
        ..Default::default()
    };
    let mut added: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = normalize_question(&row.question);
        let target = match lookup.get(&key) {
            Some(draft_id) => RevisionTarget::Draft(*draft_id),
            None => {
                let idx = *added.entry(key).or_insert_with(|| {
                    batch.new_items.push(HumanItem {
                        question_text: row.question.clone(),
                        answer: row.answer.clone().unwrap_or_default(),
                    });
                    batch.new_items.len() - 1
                });
                RevisionTarget::NewItem(idx)
            }
        };
        batch.entries.push(RevisionEntry {
            target,
            fine_tuned_response: row.answer.clone(),
            score: row.score,
            comments: row.comments.clone(),
        });
    }
    batch
}
