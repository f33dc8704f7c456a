pub mod artifact_renderer;
pub mod export_writer;
pub mod item_extractor;
pub mod knowledge;
pub mod llm_service;
pub mod sheet;

pub use artifact_renderer::{ArtifactRenderer, OutlineRenderer};
pub use export_writer::ExportWriter;
pub use knowledge::KnowledgeBase;
pub use llm_service::{OpenAiGenerator, TextGenerator};
