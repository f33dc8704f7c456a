//! LLM 服务 - 业务能力层
//!
//! 只负责"给一段提示词，拿回一段文本"，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 文本生成能力
///
/// 无状态；可能失败或超时，本身不做重试。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 写入 Draft 的模型标识
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str, temperature: f32) -> AppResult<String>;
}

/// 基于 OpenAI 兼容接口的文本生成
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs.max(1)),
        }
    }

    async fn send(&self, prompt: &str, temperature: f32) -> AppResult<String> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| AppError::llm_api_failed(&self.model_name, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(temperature)
            .build()
            .map_err(|e| AppError::llm_api_failed(&self.model_name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyContent {
                model: self.model_name.clone(),
            }
            .into());
        }

        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，提示词长度: {} 字符",
            self.model_name,
            prompt.len()
        );

        match tokio::time::timeout(self.timeout, self.send(prompt, temperature)).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!("LLM API 调用成功");
                }
                result
            }
            Err(_) => Err(LlmError::Timeout {
                model: self.model_name.clone(),
                secs: self.timeout.as_secs(),
            }
            .into()),
        }
    }
}
