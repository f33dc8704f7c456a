//! 题目处理流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 流程顺序：
//! 1. retrieve：知识库 + 题目 → 初稿，写回 Item 的检索上下文
//! 2. contextualize：重新读取 Item → 改写 → 新建 Draft
//!
//! 第一阶段失败时不会进入第二阶段；任何一步失败都不会影响同一提交里的其他题目。

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, LlmError};
use crate::infrastructure::DocumentStore;
use crate::models::{Draft, DraftStatus, Item, ItemId, NewDraft};
use crate::services::{KnowledgeBase, TextGenerator};
use crate::utils::logging::truncate_text;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::prompts::{
    contextualize_prompt, retrieval_prompt, sanitize_answer, CONTEXTUALIZE_TEMPERATURE,
    RETRIEVAL_TEMPERATURE,
};

/// 处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Contextualize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Retrieve => write!(f, "retrieve"),
            Stage::Contextualize => write!(f, "contextualize"),
        }
    }
}

/// 某道题在某个阶段失败
#[derive(Debug)]
pub struct StageFailure {
    pub item_id: ItemId,
    pub stage: Stage,
    pub error: AppError,
}

impl StageFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, AppError::Llm(LlmError::Cancelled))
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "题目 {} 在 {} 阶段失败: {}", self.item_id, self.stage, self.error)
    }
}

/// 题目处理流程
///
/// - 不关心并发，只负责一道题
/// - 只依赖存储和文本生成能力
pub struct ItemFlow {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    knowledge: Arc<KnowledgeBase>,
    org_name: String,
    verbose_logging: bool,
}

impl ItemFlow {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        knowledge: Arc<KnowledgeBase>,
        org_name: impl Into<String>,
        verbose_logging: bool,
    ) -> Self {
        Self {
            store,
            generator,
            knowledge,
            org_name: org_name.into(),
            verbose_logging,
        }
    }

    /// 依次执行两个阶段，返回新建的 Draft
    pub async fn run(
        &self,
        item: &Item,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> Result<Draft, StageFailure> {
        if self.verbose_logging {
            debug!("{} 题目: {}", ctx, truncate_text(&item.question_text, 80));
        }

        self.retrieve(item, ctx, cancel)
            .await
            .map_err(|error| StageFailure {
                item_id: item.id,
                stage: Stage::Retrieve,
                error,
            })?;

        self.contextualize(item.id, ctx, cancel)
            .await
            .map_err(|error| StageFailure {
                item_id: item.id,
                stage: Stage::Contextualize,
                error,
            })
    }

    /// 第一阶段：生成初稿并写回 Item
    pub async fn retrieve(
        &self,
        item: &Item,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        info!("{} 🔍 检索知识库并起草答案...", ctx);

        let prompt = retrieval_prompt(self.knowledge.text(), &item.question_text);
        let raw = self
            .generate(&prompt, RETRIEVAL_TEMPERATURE, cancel)
            .await?;
        let context = sanitize_answer(&raw);
        if context.is_empty() {
            return Err(LlmError::EmptyContent {
                model: self.generator.model_id().to_string(),
            }
            .into());
        }

        self.store.update_item_context(item.id, &context).await?;
        info!("{} ✓ 初稿已写入 ({} 字)", ctx, context.chars().count());
        Ok(context)
    }

    /// 第二阶段：按题目语境改写，落库为新的 Draft
    pub async fn contextualize(
        &self,
        item_id: ItemId,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> AppResult<Draft> {
        // 以存储中的上下文为准
        let item = self.store.get_item(item_id).await?;
        let context = item
            .retrieved_context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AppError::MissingContext { item_id })?
            .to_string();

        info!("{} ✍️ 结合题目语境改写答案...", ctx);
        let prompt = contextualize_prompt(&item.question_text, &context, &self.org_name);
        let raw = self
            .generate(&prompt, CONTEXTUALIZE_TEMPERATURE, cancel)
            .await?;
        let response = sanitize_answer(&raw);
        if response.is_empty() {
            warn!("{} ⚠️ 改写结果为空", ctx);
            return Err(LlmError::EmptyContent {
                model: self.generator.model_id().to_string(),
            }
            .into());
        }

        let draft = self
            .store
            .create_draft(NewDraft {
                item_id,
                model_id: self.generator.model_id().to_string(),
                retrieved_context_snapshot: Some(context),
                response_text: response,
                status: DraftStatus::InitialDraft,
            })
            .await?;

        info!("{} ✓ 已生成 Draft #{}", ctx, draft.id);
        Ok(draft)
    }

    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled.into()),
            result = self.generator.generate(prompt, temperature) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        fn model_id(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str, temperature: f32) -> AppResult<String> {
            if temperature < 0.3 {
                Ok("1. **Drafted** answer".to_string())
            } else {
                assert!(prompt.contains("Drafted answer"));
                Ok("Final answer".to_string())
            }
        }
    }

    fn flow(store: Arc<MemoryStore>) -> ItemFlow {
        ItemFlow::new(
            store,
            Arc::new(Echo),
            Arc::new(KnowledgeBase::from_text("kb")),
            "Initech",
            false,
        )
    }

    #[tokio::test]
    async fn both_stages_write_context_and_draft() {
        let store = Arc::new(MemoryStore::new());
        let sub = store.create_submission("rfp.xlsx").await.unwrap();
        let item = store.create_item(sub.id, "Q1", None).await.unwrap();
        let ctx = ItemCtx::new(sub.id, item.id, 1, 1);

        let draft = flow(store.clone())
            .run(&item, &ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.response_text, "Final answer");
        assert_eq!(draft.model_id, "echo");
        assert_eq!(draft.retrieved_context_snapshot.as_deref(), Some("Drafted answer"));
        let stored = store.get_item(item.id).await.unwrap();
        assert_eq!(stored.retrieved_context.as_deref(), Some("Drafted answer"));
    }

    #[tokio::test]
    async fn contextualize_without_context_fails() {
        let store = Arc::new(MemoryStore::new());
        let sub = store.create_submission("rfp.xlsx").await.unwrap();
        let item = store.create_item(sub.id, "Q1", None).await.unwrap();
        let ctx = ItemCtx::new(sub.id, item.id, 1, 1);

        let err = flow(store.clone())
            .contextualize(item.id, &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingContext { .. }));
        assert!(store.list_drafts(item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_generation() {
        let store = Arc::new(MemoryStore::new());
        let sub = store.create_submission("rfp.xlsx").await.unwrap();
        let item = store.create_item(sub.id, "Q1", None).await.unwrap();
        let ctx = ItemCtx::new(sub.id, item.id, 1, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = flow(store.clone()).run(&item, &ctx, &cancel).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Retrieve);
        assert!(failure.is_cancelled());
        assert!(store.get_item(item.id).await.unwrap().retrieved_context.is_none());
    }
}
