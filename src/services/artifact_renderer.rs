//! 交付物渲染服务 - 业务能力层
//!
//! 以修订后的表格为输入生成最终交付物。幻灯片排版不在本项目范围内，
//! 默认实现输出纯文本大纲：封面一节，之后每道题一节。

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::error::{AppError, AppResult, InputError};
use crate::models::Submission;
use crate::services::sheet::{self, Table};

/// 交付物渲染能力
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, submission: &Submission, revised: &Path, out: &Path) -> AppResult<()>;
}

/// 纯文本大纲渲染
#[derive(Debug, Default)]
pub struct OutlineRenderer;

#[async_trait]
impl ArtifactRenderer for OutlineRenderer {
    async fn render(&self, submission: &Submission, revised: &Path, out: &Path) -> AppResult<()> {
        let table = sheet::read_table(revised).await?;
        let outline = render_outline(&submission.filename, &table)?;

        tokio::fs::write(out, outline)
            .await
            .map_err(|e| AppError::file_write_failed(out.display().to_string(), e))?;

        info!("[提交 {}] 🖨️ 交付物已生成: {}", submission.id, out.display());
        Ok(())
    }
}

fn header_key(header: &str) -> String {
    header.trim().to_lowercase()
}

pub fn render_outline(title: &str, table: &Table) -> AppResult<String> {
    let find = |name: &str| {
        table.find_column(name, header_key).ok_or_else(|| {
            AppError::from(InputError::MissingColumn {
                column: name.to_string(),
            })
        })
    };
    let question_col = find("questions")?;
    let answer_col = find("answers")?;

    let mut out = String::new();
    out.push_str(&format!("{}\n{}\n\n", title, "=".repeat(title.chars().count().max(3))));

    let mut section = 0;
    for row in 0..table.rows.len() {
        let Some(question) = table.cell(row, question_col).as_text() else {
            continue;
        };
        section += 1;
        let answer = table.cell(row, answer_col).as_text().unwrap_or_default();

        out.push_str(&format!("{}. {}\n", section, question.trim()));
        out.push_str(&"-".repeat(40));
        out.push('\n');
        for line in answer.lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("  {}\n", line.trim()));
        }
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sheet::Cell;

    #[test]
    fn outline_has_one_section_per_question() {
        let table = Table {
            headers: vec!["Questions".into(), "Answers".into()],
            rows: vec![
                vec![Cell::from("What is your support model?"), Cell::from("24/7 support.\n\nFollow-the-sun.")],
                vec![Cell::Empty, Cell::from("orphan answer")],
                vec![Cell::from("Describe your SLAs."), Cell::Empty],
            ],
        };

        let outline = render_outline("rfp.xlsx", &table).unwrap();
        assert!(outline.starts_with("rfp.xlsx\n"));
        assert!(outline.contains("1. What is your support model?"));
        assert!(outline.contains("  24/7 support.\n  Follow-the-sun.\n"));
        assert!(outline.contains("2. Describe your SLAs."));
        assert!(!outline.contains("orphan answer"));
    }

    #[test]
    fn outline_requires_answer_column() {
        let table = Table {
            headers: vec!["Questions".into()],
            rows: vec![],
        };
        assert!(render_outline("t", &table).is_err());
    }
}
