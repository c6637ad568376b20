// Resumable Upload Library
// 大文件分片上传、断点续传核心库

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 公共模块（进度节流、显示格式）
pub mod common;

// 断点持久化模块
pub mod persistence;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, PersistenceConfig, ProgressConfig, UploadConfig};
pub use persistence::{Checkpoint, CheckpointBackend, FileBackend, MemoryBackend, ResumeStore};
pub use uploader::{
    ChunkPlan, ChunkTransport, Destination, FileIdentity, HttpChunkTransport, ProgressReport,
    StatusTag, TransferOrchestrator, TransferPhase, UploadError, UploadResponse, UploadState,
};
