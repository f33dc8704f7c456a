//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（记录存储、磁盘目录），只暴露能力，不认识业务流程。

pub mod file_storage;
pub mod store;

pub use file_storage::{FileKind, FileStorage};
pub use store::{DocumentStore, MemoryStore};
