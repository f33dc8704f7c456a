//! 题目提取服务 - 业务能力层
//!
//! 只负责"从上传的表格里读出题目列表"，不写存储。
//! 是否需要提取（幂等）由调用方决定。

use std::path::Path;
use tracing::debug;

use crate::error::{AppResult, InputError};
use crate::services::sheet::{self, Table};

/// 题目列的规范化列名
pub const QUESTION_COLUMN: &str = "questions";

/// 列名规范化：去掉所有空白并转小写（"Questions " / "QUESTIONS" / "Ques tions" 都算）
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// 从表格文件中提取题目文本，保持原有顺序，丢弃空单元格
pub async fn extract(path: &Path) -> AppResult<Vec<String>> {
    let table = sheet::read_table(path).await?;
    let questions = extract_from_table(&table)?;
    debug!("从 {} 提取到 {} 道题目", path.display(), questions.len());
    Ok(questions)
}

pub fn extract_from_table(table: &Table) -> AppResult<Vec<String>> {
    let column = table
        .find_column(QUESTION_COLUMN, normalize_header)
        .ok_or_else(|| InputError::MissingColumn {
            column: QUESTION_COLUMN.to_string(),
        })?;

    Ok((0..table.rows.len())
        .filter_map(|row| table.cell(row, column).as_text())
        .map(|text| text.trim().to_string())
        .collect())
}
