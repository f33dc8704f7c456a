use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rfp_responder::orchestrator::GenerateOutcome;
use rfp_responder::utils::logging;
use rfp_responder::{App, Config, FileKind};

#[derive(Parser)]
#[command(name = "rfp_responder", version, about = "采购问卷答题助手")]
struct Cli {
    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 上传问卷表格（.xlsx）
    Upload { file: PathBuf },
    /// 提取题目并生成答案（Ctrl-C 取消）
    Generate { id: u64 },
    /// 上传修订后的表格并对账
    Revise { id: u64, file: PathBuf },
    /// 列出提交（最新优先）
    List {
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// 下载文件
    Download {
        id: u64,
        #[arg(long, default_value = "export")]
        kind: FileKind,
        /// 输出路径，默认使用建议的文件名
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// 根据修订表格生成交付物
    Artifact { id: u64 },
    /// 查看提交详情
    Show { id: u64 },
}

/// 初始化日志，再加载配置（加载过程本身会打日志）
fn startup(verbose: bool, load: impl FnOnce() -> Result<Config>) -> Result<Config> {
    logging::init(verbose);

    let mut config = load()?;
    config.verbose_logging |= verbose;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = startup(cli.verbose, Config::load)?;

    let app = App::initialize(config).await?;

    match cli.command {
        Command::Upload { file } => {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("无效的文件路径")?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("读取 {} 失败", file.display()))?;
            let submission = app.upload(&filename, &bytes).await?;
            println!("{}", submission.id);
        }
        Command::Generate { id } => {
            let cancel = CancellationToken::new();
            let watcher = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹️ 收到 Ctrl-C，正在取消...");
                    watcher.cancel();
                }
            });

            match app.generate_with_cancel(id, cancel).await? {
                GenerateOutcome::NoItems => println!("表格中没有找到题目"),
                GenerateOutcome::Processed(report) => {
                    println!(
                        "已处理 {} 道题目: 成功 {}, 失败 {}, 未开始 {}",
                        report.total,
                        report.succeeded(),
                        report.failures.len(),
                        report.skipped.len()
                    );
                    for failure in &report.failures {
                        println!("  题目 {}: {}", failure.item_id, failure.message);
                    }
                }
            }
        }
        Command::Revise { id, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("读取 {} 失败", file.display()))?;
            let created = app.upload_revision(id, &bytes).await?;
            println!("已记录 {} 条评审", created.len());
        }
        Command::List { page, page_size } => {
            for s in app.list(page, page_size).await? {
                println!(
                    "{:>6}  {:<20}  {}  {}",
                    s.id,
                    s.status.to_string(),
                    s.uploaded_at.format("%Y-%m-%d %H:%M"),
                    s.filename
                );
            }
        }
        Command::Download { id, kind, out } => {
            let (path, suggested) = app.download(id, kind).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(suggested));
            tokio::fs::copy(&path, &out)
                .await
                .with_context(|| format!("复制到 {} 失败", out.display()))?;
            info!("已保存到 {}", out.display());
            println!("{}", out.display());
        }
        Command::Artifact { id } => {
            let path = app.generate_artifact(id).await?;
            println!("{}", path.display());
        }
        Command::Show { id } => {
            let detail = app.show(id).await?;
            let s = &detail.submission;
            println!("#{} {} [{}]", s.id, s.filename, s.status);
            for (idx, d) in detail.items.iter().enumerate() {
                println!(
                    "{:>3}. [{}] {}",
                    idx + 1,
                    d.item.status,
                    logging::truncate_text(&d.item.question_text, 70)
                );
                match &d.live_draft {
                    Some(draft) => println!(
                        "     draft #{} ({}), {} 个版本, {} 条评审",
                        draft.id, draft.model_id, d.draft_count, d.evaluation_count
                    ),
                    None => println!("     (无答案)"),
                }
            }
        }
    }

    Ok(())
}
