use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "rfp_responder.toml";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的题目数量上限
    pub max_concurrent_items: usize,
    /// 数据目录（上传文件、导出文件、存储快照）
    pub data_dir: PathBuf,
    /// 知识库目录
    pub knowledge_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 列表默认分页大小
    pub list_page_size: usize,
    /// 导出表格的最大列宽（字符宽度）
    pub export_max_column_width: usize,
    /// 第二阶段改写时使用的机构名称
    pub org_name: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_items: 16,
            data_dir: PathBuf::from("data"),
            knowledge_dir: PathBuf::from("knowledge"),
            verbose_logging: false,
            list_page_size: 5,
            export_max_column_width: 60,
            org_name: "our company".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 120,
        }
    }
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（可选）→ 环境变量
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("RFP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config = if path.exists() {
            info!("📄 读取配置文件: {}", path.display());
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };

        Ok(config.apply_env())
    }

    /// 从 TOML 文件加载，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// 用环境变量覆盖配置
    pub fn apply_env(self) -> Self {
        let base = self;
        Self {
            max_concurrent_items: env_parse("MAX_CONCURRENT_ITEMS", base.max_concurrent_items),
            data_dir: std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or(base.data_dir),
            knowledge_dir: std::env::var("KNOWLEDGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(base.knowledge_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING", base.verbose_logging),
            list_page_size: env_parse("LIST_PAGE_SIZE", base.list_page_size),
            export_max_column_width: env_parse(
                "EXPORT_MAX_COLUMN_WIDTH",
                base.export_max_column_width,
            ),
            org_name: std::env::var("ORG_NAME").unwrap_or(base.org_name),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(base.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(base.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(base.llm_model_name),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", base.llm_timeout_secs),
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Self {
        if self.max_concurrent_items == 0 {
            warn!("⚠️ max_concurrent_items 不能为 0，已调整为 1");
            self.max_concurrent_items = 1;
        }
        if self.list_page_size == 0 {
            self.list_page_size = Self::default().list_page_size;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("⚠️ 环境变量 {} 的值 '{}' 无法解析，使用默认值", name, raw);
                fallback
            }
        },
        Err(_) => fallback,
    }
}
