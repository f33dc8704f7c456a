//! 表格读写服务 - 业务能力层
//!
//! 只负责"把 xlsx 读成行列 / 把行列写成 xlsx"，不认识题目和评审

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, AppResult, FileError, InputError};

/// 单元格
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Cell {
    /// 单元格是否为空（空白字符串也算空）
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 单元格的文本形式，空单元格返回 `None`
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    fn display_width(&self) -> usize {
        self.as_text().map(|s| s.chars().count()).unwrap_or(0)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

/// 第一行为表头的表格
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// 按规范化后的列名查找列
    pub fn find_column(&self, wanted: &str, normalize: impl Fn(&str) -> String) -> Option<usize> {
        self.headers.iter().position(|h| normalize(h) == wanted)
    }

    /// 取单元格，行长度不足时视为空
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(EMPTY)
    }
}

/// 读取工作簿的第一个工作表
///
/// 解析放在阻塞线程池中执行，不占用异步调度器
pub async fn read_table(path: &Path) -> AppResult<Table> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_table_blocking(&path))
        .await
        .map_err(|e| AppError::file_read_failed("<spawn_blocking>", e))?
}

pub fn read_table_blocking(path: &Path) -> AppResult<Table> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let shown = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).map_err(|e| AppError::file_read_failed(&shown, e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| AppError::file_read_failed(&shown, e))?,
        None => return Err(InputError::EmptyWorkbook { path: shown }.into()),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|d| Cell::from(d).as_text().unwrap_or_default())
            .collect(),
        None => return Ok(Table::default()),
    };

    let rows: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>())
        .filter(|row: &Vec<Cell>| !row.iter().all(Cell::is_blank))
        .collect();

    debug!("读取表格 {}: {} 列, {} 行", shown, headers.len(), rows.len());

    Ok(Table { headers, rows })
}

/// 写入表格：所有单元格自动换行、顶端对齐，列宽按内容计算并封顶
pub async fn write_table(
    path: &Path,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    max_column_width: usize,
) -> AppResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        write_table_blocking(&path, &headers, &rows, max_column_width)
    })
    .await
    .map_err(|e| AppError::file_write_failed("<spawn_blocking>", e))?
}

pub fn write_table_blocking(
    path: &Path,
    headers: &[String],
    rows: &[Vec<Cell>],
    max_column_width: usize,
) -> AppResult<()> {
    let shown = path.display().to_string();
    let write_err = |e: rust_xlsxwriter::XlsxError| AppError::file_write_failed(&shown, e);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let wrap = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header.as_str(), &wrap)
            .map_err(write_err)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let excel_col = col as u16;
            match cell {
                Cell::Empty => continue,
                Cell::Text(s) => worksheet
                    .write_string_with_format(excel_row, excel_col, s.as_str(), &wrap)
                    .map(|_| ()),
                Cell::Int(i) => worksheet
                    .write_number_with_format(excel_row, excel_col, *i as f64, &wrap)
                    .map(|_| ()),
                Cell::Float(f) => worksheet
                    .write_number_with_format(excel_row, excel_col, *f, &wrap)
                    .map(|_| ()),
                Cell::Bool(b) => worksheet
                    .write_boolean_with_format(excel_row, excel_col, *b, &wrap)
                    .map(|_| ()),
            }
            .map_err(write_err)?;

            if widths.len() <= col {
                widths.resize(col + 1, 0);
            }
            widths[col] = widths[col].max(cell.display_width());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet
            .set_column_width(col as u16, column_width(*width, max_column_width) as f64)
            .map_err(write_err)?;
    }

    workbook.save(path).map_err(write_err)?;
    debug!("写入表格 {}: {} 行", shown, rows.len());
    Ok(())
}

/// 列宽 = 最长内容 + 2，但不超过上限
pub fn column_width(longest: usize, max_column_width: usize) -> usize {
    (longest + 2).min(max_column_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_text_counts_as_blank() {
        assert!(Cell::Text("   ".to_string()).is_blank());
        assert!(Cell::Empty.is_blank());
        assert!(!Cell::Int(0).is_blank());
        assert_eq!(Cell::Text("  \t".to_string()).as_text(), None);
    }

    #[test]
    fn integral_floats_render_without_fraction() {
        assert_eq!(Cell::Float(4.0).as_text().as_deref(), Some("4"));
        assert_eq!(Cell::Float(4.5).as_text().as_deref(), Some("4.5"));
    }

    #[test]
    fn column_width_is_capped() {
        assert_eq!(column_width(10, 60), 12);
        assert_eq!(column_width(500, 60), 60);
    }

    #[test]
    fn written_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.xlsx");
        let headers = vec!["Questions".to_string(), "Ratings".to_string()];
        let rows = vec![
            vec![Cell::from("What is your support model?"), Cell::Int(4)],
            vec![Cell::Empty, Cell::Empty],
            vec![Cell::from("Describe your SLAs."), Cell::Empty],
        ];

        write_table_blocking(&path, &headers, &rows, 60).unwrap();
        let table = read_table_blocking(&path).unwrap();

        assert_eq!(table.headers, headers);
        // 全空行被丢弃
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.cell(0, 0).as_text().as_deref(),
            Some("What is your support model?")
        );
        assert_eq!(table.cell(0, 1).as_text().as_deref(), Some("4"));
        assert!(table.cell(1, 1).is_blank());
        assert!(table.cell(9, 9).is_blank());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_table_blocking(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, AppError::File(FileError::NotFound { .. })));
    }
}
