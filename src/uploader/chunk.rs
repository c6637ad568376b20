// 上传分片规划
//
// 分片规则：
// - 文件 <= min_chunk_threshold：无需分片，整文件一次 PUT
// - 否则按固定 chunk_size 切分，最后一片截断到剩余字节
// - 分片范围为闭区间 [start, end]，与 Content-Range 头保持一致

use crate::uploader::error::UploadError;
use tracing::debug;

/// 默认分片大小: 2MB
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// 默认分片阈值: 20MB（不超过该大小的文件走整文件上传）
pub const DEFAULT_MIN_CHUNK_THRESHOLD: u64 = 20 * 1024 * 1024;

/// 上传模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// 整文件单次上传
    Single,
    /// 顺序分片上传
    Chunked,
}

/// 字节范围（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// 分片索引
    pub index: usize,
    /// 起始字节（含）
    pub start: u64,
    /// 结束字节（含）
    pub end: u64,
}

impl ByteRange {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self { index, start, end }
    }

    /// 分片大小
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// 闭区间至少包含一个字节
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 生成 Content-Range 头的值：`bytes {start}-{end}/{total}`
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// 分片计划
///
/// 按顺序排列的字节范围，恰好覆盖 `[0, total)`，无空洞、无重叠
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    mode: ChunkMode,
    total_bytes: u64,
    chunk_size: u64,
    ranges: Vec<ByteRange>,
}

impl ChunkPlan {
    /// 计算分片计划
    ///
    /// # 参数
    /// * `total_bytes` - 文件总大小（必须大于 0）
    /// * `chunk_size` - 分片大小（分片模式下必须大于 0）
    /// * `min_chunk_threshold` - 分片阈值，`total_bytes <= min_chunk_threshold` 时走整文件上传
    pub fn new(
        total_bytes: u64,
        chunk_size: u64,
        min_chunk_threshold: u64,
    ) -> Result<Self, UploadError> {
        if total_bytes == 0 {
            return Err(UploadError::Validation("文件大小必须大于 0".to_string()));
        }

        if total_bytes <= min_chunk_threshold {
            return Ok(Self {
                mode: ChunkMode::Single,
                total_bytes,
                chunk_size: total_bytes,
                ranges: vec![ByteRange::new(0, 0, total_bytes - 1)],
            });
        }

        if chunk_size == 0 {
            return Err(UploadError::Validation("分片大小必须大于 0".to_string()));
        }

        let ranges = Self::calculate_ranges(total_bytes, chunk_size);

        debug!(
            "分片计划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            total_bytes,
            chunk_size,
            ranges.len()
        );

        Ok(Self {
            mode: ChunkMode::Chunked,
            total_bytes,
            chunk_size,
            ranges,
        })
    }

    fn calculate_ranges(total_bytes: u64, chunk_size: u64) -> Vec<ByteRange> {
        let count = total_bytes.div_ceil(chunk_size) as usize;
        let mut ranges = Vec::with_capacity(count);
        let mut offset = 0u64;
        let mut index = 0;

        while offset < total_bytes {
            let end = std::cmp::min(offset + chunk_size, total_bytes);
            ranges.push(ByteRange::new(index, offset, end - 1));
            offset = end;
            index += 1;
        }

        ranges
    }

    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// 分片数量
    pub fn chunk_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, index: usize) -> Option<&ByteRange> {
        self.ranges.get(index)
    }

    /// 某个分片之前已经覆盖的字节数（用于断点续传时的进度基线）
    pub fn bytes_before(&self, index: usize) -> u64 {
        self.ranges
            .get(index)
            .map(|r| r.start)
            .unwrap_or(self.total_bytes)
    }
}
