//! 导出服务 - 业务能力层
//!
//! 把当前的 Draft 渲染成供人工评审的表格。
//! 列名就是对账引擎读回时要求的列（规范化后为 questions / answers / ratings / comments）。

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::infrastructure::{DocumentStore, FileKind, FileStorage};
use crate::models::{live_draft, SubmissionId};
use crate::services::sheet::{self, Cell};

/// 导出表格的表头
pub const EXPORT_HEADERS: [&str; 5] = ["S.No", "Questions", "Answers", "Ratings", "Comments"];

pub struct ExportWriter {
    store: Arc<dyn DocumentStore>,
    files: FileStorage,
    max_column_width: usize,
}

impl ExportWriter {
    pub fn new(store: Arc<dyn DocumentStore>, files: FileStorage, max_column_width: usize) -> Self {
        Self {
            store,
            files,
            max_column_width,
        }
    }

    /// 按题目创建顺序写出 `[序号, 题目, 答案, 评分(空), 评论(空)]`
    pub async fn write(&self, submission_id: SubmissionId) -> AppResult<PathBuf> {
        let loaded = self.store.load_items_with_drafts(submission_id).await?;

        let mut rows = Vec::with_capacity(loaded.len());
        for (index, (item, drafts)) in loaded.iter().enumerate() {
            let answer = match live_draft(drafts) {
                Some(draft) => Cell::Text(draft.response_text.clone()),
                None => {
                    warn!(
                        "[提交 {}] ⚠️ 题目 {} 没有答案，导出为空",
                        submission_id, item.id
                    );
                    Cell::Empty
                }
            };
            rows.push(vec![
                Cell::Int(index as i64 + 1),
                Cell::Text(item.question_text.clone()),
                answer,
                Cell::Empty,
                Cell::Empty,
            ]);
        }

        let path = self.files.path_for(FileKind::Export, submission_id);
        self.files.ensure_parent(&path).await?;

        let headers = EXPORT_HEADERS.iter().map(|h| h.to_string()).collect();
        let row_count = rows.len();
        sheet::write_table(&path, headers, rows, self.max_column_width).await?;

        info!(
            "[提交 {}] 📄 已导出 {} 道题目到 {}",
            submission_id,
            row_count,
            path.display()
        );
        Ok(path)
    }
}
