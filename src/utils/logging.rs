//! 日志工具模块
//!
//! 提供日志初始化以及格式化输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::PipelineReport;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则默认 `info`，详细模式下为 `debug`。重复调用时忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 RFP 答题助手启动");
    info!("📁 数据目录: {}", config.data_dir.display());
    info!("📚 知识库目录: {}", config.knowledge_dir.display());
    info!("🤖 模型: {}", config.llm_model_name);
    info!("📊 最大并发数: {}", config.max_concurrent_items);
    info!("{}", "=".repeat(60));
}

/// 记录流水线开始信息
pub fn log_pipeline_start(submission_id: u64, total: usize, max_concurrent: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 [提交 {}] 开始处理 {} 道题目", submission_id, total);
    info!("📋 同时最多处理 {} 道", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 打印流水线统计信息
pub fn log_pipeline_complete(report: &PipelineReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 [提交 {}] 处理完成统计", report.submission_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.succeeded(), report.total);
    info!("❌ 失败: {}", report.failures.len());
    for failure in &report.failures {
        info!(
            "   - 题目 {} ({}): {}",
            failure.item_id,
            failure
                .stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "task".to_string()),
            truncate_text(&failure.message, 80)
        );
    }
    if let Some(path) = &report.export_path {
        info!("📄 导出文件: {}", path.display());
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_text("你好世界", 2), "你好...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
