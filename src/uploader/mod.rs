// 上传引擎模块
//
// - 分片计划：小文件整文件上传，大文件按固定大小顺序分片
// - 分片传输：单次 byte-range PUT，可随时中止
// - 进度估算：滑动窗口 + EMA 平滑速度与剩余时间
// - 编排器：组合以上部分，配合断点存储实现断点续传

pub mod chunk;
pub mod engine;
pub mod error;
pub mod file;
pub mod progress;
pub mod task;
pub mod transport;

pub use chunk::{
    ByteRange, ChunkMode, ChunkPlan, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_THRESHOLD,
};
pub use engine::{StatusCallback, TransferOrchestrator};
pub use error::{UploadError, UploadErrorKind};
pub use file::{FileIdentity, LocalFile};
pub use progress::{ProgressEstimator, ProgressReport, ProgressSink, SpeedSample};
pub use task::{StatusTag, TransferPhase, UploadState};
pub use transport::{
    ByteProgressFn, ChunkRequest, ChunkTransport, Destination, HttpChunkTransport, RawResponse,
    UploadResponse, DEFAULT_PROGRESS_STEP,
};
