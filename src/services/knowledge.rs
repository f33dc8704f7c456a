//! 知识库加载服务 - 业务能力层
//!
//! 把参考资料目录下的所有文本拼成一份静态语料，每次流水线运行只加载一次。
//! 支持 `.txt` / `.md`、`.pdf`、`.pptx`；读不出来的文件记录警告后跳过。

use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// 加载好的知识库语料
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    text: String,
    sources: Vec<PathBuf>,
}

impl KnowledgeBase {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// 加载目录下的全部资料（递归，按路径排序）
pub async fn load(dir: &Path) -> AppResult<KnowledgeBase> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || load_blocking(&dir))
        .await
        .map_err(|e| AppError::file_read_failed("<spawn_blocking>", e))
}

pub fn load_blocking(dir: &Path) -> KnowledgeBase {
    if !dir.is_dir() {
        warn!("⚠️ 知识库目录不存在: {}，使用空语料", dir.display());
        return KnowledgeBase::default();
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files);
    files.sort();

    let mut kb = KnowledgeBase::default();
    for path in files {
        match load_file_text(&path) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                kb.text.push_str(&text);
                kb.text.push('\n');
                kb.sources.push(path);
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ 无法读取资料 {}: {}", path.display(), e),
        }
    }

    info!(
        "📚 知识库已加载: {} 个文件, {} 字符",
        kb.sources.len(),
        kb.text.chars().count()
    );
    kb
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("⚠️ 无法读取目录 {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else if is_supported(&path) {
            out.push(path);
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_str(), "txt" | "md" | "pdf" | "pptx")
}

/// 读取单个文件的文本；不支持的类型返回 `None`
fn load_file_text(path: &Path) -> anyhow::Result<Option<String>> {
    let text = match extension(path).as_str() {
        "txt" | "md" => std::fs::read_to_string(path)?,
        "pdf" => pdf_extract::extract_text(path)
            .map_err(|e| anyhow::anyhow!("PDF 解析失败: {:?}", e))?,
        "pptx" => pptx_text(path)?,
        _ => return Ok(None),
    };
    Ok(Some(text))
}

/// 读取 pptx 中每张幻灯片的文字（按幻灯片编号顺序）
fn pptx_text(path: &Path) -> anyhow::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort();

    let mut text = String::new();
    for (_, name) in slides {
        let mut xml = String::new();
        archive.by_name(&name)?.read_to_string(&mut xml)?;
        let slide_text = slide_xml_text(&xml);
        if !slide_text.is_empty() {
            text.push_str(&slide_text);
            text.push('\n');
        }
    }
    Ok(text)
}

fn slide_number(name: &str) -> Option<u32> {
    static SLIDE: OnceLock<Regex> = OnceLock::new();
    let re = SLIDE.get_or_init(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
    re.captures(name).and_then(|c| c[1].parse().ok())
}

/// 提取幻灯片 XML 中的文本段（`<a:t>`），每个段落一行
fn slide_xml_text(xml: &str) -> String {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    static RUN: OnceLock<Regex> = OnceLock::new();
    let paragraph = PARAGRAPH.get_or_init(|| Regex::new(r"(?s)<a:p>.*?</a:p>").unwrap());
    let run = RUN.get_or_init(|| Regex::new(r"<a:t>([^<]*)</a:t>").unwrap());

    paragraph
        .find_iter(xml)
        .map(|p| {
            run.captures_iter(p.as_str())
                .map(|c| unescape_xml(&c[1]))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
