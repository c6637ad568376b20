//! 断点记录类型定义

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::uploader::{Destination, FileIdentity, UploadError};

/// 断点记录
///
/// `chunk_index` 永远指向服务器已确认的最后一个分片，续传从 `chunk_index + 1` 开始。
/// 以 JSON 存储，字段名与历史格式保持一致（camelCase）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// 文件标识（`{name}_{size}_{mtime_ms}`）
    pub file_identity: String,

    /// 最后确认的分片索引
    pub chunk_index: usize,

    /// 分片总数
    pub total_chunks: usize,

    /// 上传会话地址
    pub upload_url: String,

    /// 服务器侧文件 ID
    #[serde(default)]
    pub server_file_id: Option<String>,

    /// 写入时间（Unix 毫秒）
    pub timestamp: i64,
}

impl Checkpoint {
    /// 以当前时间创建断点记录
    pub fn new(
        identity: &FileIdentity,
        chunk_index: usize,
        total_chunks: usize,
        destination: &Destination,
    ) -> Self {
        Self {
            file_identity: identity.key(),
            chunk_index,
            total_chunks,
            upload_url: destination.upload_url.clone(),
            server_file_id: destination.server_file_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 续传起始分片
    ///
    /// 等于 `total_chunks` 时表示所有分片都已确认
    pub fn next_chunk(&self) -> usize {
        self.chunk_index.saturating_add(1)
    }

    /// 写入时间
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// 记录年龄；时间戳超出可表示范围时为 None
    ///
    /// 时间戳晚于 `now` 时为负值
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.written_at().map(|t| now.signed_duration_since(t))
    }

    /// 检查记录自身是否自洽
    ///
    /// 能解析但数值不合理（分片索引越界、时间戳无法表示）的记录视为损坏
    pub fn check_consistency(&self) -> Result<(), UploadError> {
        if self.chunk_index >= self.total_chunks {
            return Err(UploadError::StorageCorruption(format!(
                "分片索引越界 ({}/{})",
                self.chunk_index, self.total_chunks
            )));
        }
        if self.written_at().is_none() {
            return Err(UploadError::StorageCorruption(format!(
                "时间戳无效: {}",
                self.timestamp
            )));
        }
        Ok(())
    }

    /// 还原上传目标
    pub fn destination(&self) -> Destination {
        Destination {
            upload_url: self.upload_url.clone(),
            server_file_id: self.server_file_id.clone(),
        }
    }
}
