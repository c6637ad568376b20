//! 断点持久化模块
//!
//! 该模块负责上传断点的保存、校验和清理：
//! - 每个文件标识一条断点记录，互不干扰
//! - 断点只在服务器确认分片之后写入，续传位置不会超过服务器已确认的进度
//! - 记录损坏、过期、上传会话变化时自动作废
//!
//! ## 使用示例
//!
//! ```ignore
//! use crate::persistence::{ResumeStore, Checkpoint};
//!
//! let store = ResumeStore::from_config(&config.persistence);
//!
//! // 分片 i 被服务器确认后
//! store.save(&Checkpoint::new(&identity, i, total_chunks, &destination));
//!
//! // 重新启动后
//! if let Some(checkpoint) = store.lookup(&identity, &destination) {
//!     resume_from = checkpoint.next_chunk();
//! }
//!
//! // 全部完成
//! store.clear(&identity);
//! ```

pub mod backend;
pub mod checkpoint;
pub mod types;

pub use backend::{CheckpointBackend, FileBackend, MemoryBackend};
pub use checkpoint::{
    ResumeStore, CHECKPOINT_KEY_PREFIX, DEFAULT_CHECKPOINT_MAX_AGE_HOURS, LEGACY_CHECKPOINT_KEY,
};
pub use types::Checkpoint;
