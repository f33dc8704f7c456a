//! 题目处理上下文
//!
//! 封装"我正在处理哪个提交的第几题"这一信息

use std::fmt::Display;

use crate::models::{ItemId, SubmissionId};

/// 题目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    pub submission_id: SubmissionId,
    pub item_id: ItemId,
    /// 题目在提交中的序号（从1开始，仅用于日志显示）
    pub item_index: usize,
    pub total_items: usize,
}

impl ItemCtx {
    pub fn new(
        submission_id: SubmissionId,
        item_id: ItemId,
        item_index: usize,
        total_items: usize,
    ) -> Self {
        Self {
            submission_id,
            item_id,
            item_index,
            total_items,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[提交 #{} 题目 {}/{} (ID#{})]",
            self.submission_id, self.item_index, self.total_items, self.item_id
        )
    }
}
