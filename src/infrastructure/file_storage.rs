//! 文件存储 - 基础设施层
//!
//! 负责磁盘目录布局：所有文件都按提交 ID 命名，不使用用户上传的原始文件名

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, FileError};
use crate::models::SubmissionId;

/// 唯一支持的上传格式
pub const SUPPORTED_EXTENSION: &str = "xlsx";

/// 存储的文件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// 用户上传的原始问卷
    Original,
    /// 评审后上传的修订版
    Revised,
    /// 生成答案后导出的表格
    Export,
    /// 最终生成的交付物
    Artifact,
}

impl FileKind {
    fn dir_name(self) -> &'static str {
        match self {
            FileKind::Original => "uploads",
            FileKind::Revised => "revised",
            FileKind::Export => "exports",
            FileKind::Artifact => "artifacts",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            FileKind::Artifact => "txt",
            _ => SUPPORTED_EXTENSION,
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" => Ok(FileKind::Original),
            "revised" => Ok(FileKind::Revised),
            "export" => Ok(FileKind::Export),
            "artifact" => Ok(FileKind::Artifact),
            other => Err(format!("未知的文件种类: {}", other)),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileKind::Original => "original",
            FileKind::Revised => "revised",
            FileKind::Export => "export",
            FileKind::Artifact => "artifact",
        };
        f.write_str(s)
    }
}

/// 文件存储
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 某个提交某类文件的固定路径
    pub fn path_for(&self, kind: FileKind, id: SubmissionId) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}.{}", id, kind.extension()))
    }

    /// 待确认文件的路径：与正式文件同目录、同扩展名
    pub fn pending_path_for(&self, kind: FileKind, id: SubmissionId) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}.pending.{}", id, kind.extension()))
    }

    /// 校验上传文件的扩展名
    pub fn check_extension(filename: &str) -> AppResult<()> {
        let ok = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(SUPPORTED_EXTENSION))
            .unwrap_or(false);

        if ok {
            Ok(())
        } else {
            Err(crate::error::InputError::UnsupportedFileType {
                filename: filename.to_string(),
                expected: format!(".{}", SUPPORTED_EXTENSION),
            }
            .into())
        }
    }

    /// 写入文件（自动创建目录），返回写入路径
    pub async fn save(&self, kind: FileKind, id: SubmissionId, bytes: &[u8]) -> AppResult<PathBuf> {
        let path = self.path_for(kind, id);
        self.write(&path, bytes).await?;
        debug!("已保存 {} 文件: {}", kind, path.display());
        Ok(path)
    }

    /// 写入待确认文件，正式文件保持不变
    pub async fn save_pending(
        &self,
        kind: FileKind,
        id: SubmissionId,
        bytes: &[u8],
    ) -> AppResult<PathBuf> {
        let path = self.pending_path_for(kind, id);
        self.write(&path, bytes).await?;
        debug!("已保存待确认的 {} 文件: {}", kind, path.display());
        Ok(path)
    }

    /// 用待确认文件替换正式文件
    pub async fn promote_pending(&self, kind: FileKind, id: SubmissionId) -> AppResult<PathBuf> {
        let pending = self.pending_path_for(kind, id);
        let path = self.path_for(kind, id);
        tokio::fs::rename(&pending, &path)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        debug!("{} 文件已生效: {}", kind, path.display());
        Ok(path)
    }

    /// 丢弃待确认文件，文件不存在时忽略
    pub async fn discard_pending(&self, kind: FileKind, id: SubmissionId) {
        let path = self.pending_path_for(kind, id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ 无法删除文件 {}: {}", path.display(), e);
            }
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> AppResult<()> {
        self.ensure_parent(path).await?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
    }

    pub async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
        Ok(())
    }

    /// 查找已存在的文件，磁盘上不存在时返回 `FileError::NotFound`
    pub async fn existing(&self, kind: FileKind, id: SubmissionId) -> AppResult<PathBuf> {
        let path = self.path_for(kind, id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            Err(FileError::NotFound {
                path: path.display().to_string(),
            }
            .into())
        }
    }
}
