use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（上传的表格不合法）
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 记录不存在
    #[error("{entity} 不存在 (id: {id})")]
    NotFound { entity: &'static str, id: u64 },
    /// 非法的状态迁移
    #[error("非法的状态迁移: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    /// 第二阶段缺少第一阶段写入的上下文
    #[error("题目 {item_id} 缺少检索上下文")]
    MissingContext { item_id: u64 },
    /// 同一提交上已有操作在执行
    #[error("提交 {submission_id} 正在执行其他操作")]
    Conflict { submission_id: u64 },
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 缺少题目列
    #[error("文件中找不到列 '{column}'")]
    MissingColumn { column: String },
    /// 缺少修订文件所需的列
    #[error("缺少必需的列: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },
    /// 单行数据校验失败
    #[error("第 {row} 行的 '{column}' 列不合法 ('{value}'): {reason}")]
    RowValidation {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },
    /// 不支持的文件类型
    #[error("不支持的文件类型: {filename} (仅支持 {expected})")]
    UnsupportedFileType { filename: String, expected: String },
    /// 表格没有任何工作表
    #[error("表格中没有可读取的工作表: {path}")]
    EmptyWorkbook { path: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 调用超时
    #[error("LLM调用超时 (模型: {model}, {secs}秒)")]
    Timeout { model: String, secs: u64 },
    /// 调用被取消
    #[error("LLM调用已取消")]
    Cancelled,
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 持久化快照失败
    #[error("持久化失败 ({path}): {source}")]
    PersistFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 加载快照失败
    #[error("加载存储快照失败 ({path}): {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        AppError::NotFound { entity, id }
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 是否属于调用方的问题（400 类），其余视为服务端失败（500 类）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Input(_)
                | AppError::NotFound { .. }
                | AppError::File(FileError::NotFound { .. })
                | AppError::IllegalTransition { .. }
                | AppError::Conflict { .. }
        )
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
