// 本地待上传文件

use crate::uploader::chunk::ByteRange;
use crate::uploader::error::UploadError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 文件标识
///
/// 由文件名、大小、最后修改时间（Unix 毫秒）组成；
/// 同一个未修改的本地文件在重启后得到相同的标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    name: String,
    size: u64,
    last_modified_ms: i64,
}

impl FileIdentity {
    pub fn new(name: impl Into<String>, size: u64, last_modified_ms: i64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified_ms,
        }
    }

    /// 标识字符串：`{name}_{size}_{mtime_ms}`
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.name, self.size, self.last_modified_ms)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// 本地文件
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    identity: FileIdentity,
}

impl LocalFile {
    /// 读取文件元信息并生成标识
    pub async fn open(path: &Path) -> Result<Self, UploadError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Validation(format!(
                "不是普通文件: {:?}",
                path
            )));
        }

        // 非 UTF-8 文件名按有损转换，同一路径转换结果稳定
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::Validation(format!("无法获取文件名: {:?}", path)))?;

        let modified: DateTime<Utc> = metadata.modified()?.into();
        let identity = FileIdentity::new(name, metadata.len(), modified.timestamp_millis());

        Ok(Self {
            path: path.to_path_buf(),
            identity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn size(&self) -> u64 {
        self.identity.size
    }

    /// 读取指定字节范围
    pub async fn read_range(&self, range: &ByteRange) -> Result<Bytes, UploadError> {
        let mut file = File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(range.start)).await?;

        let mut buffer = vec![0u8; range.len() as usize];
        file.read_exact(&mut buffer).await?;

        debug!(
            "读取分片 #{}: bytes={}-{}, 大小={} bytes",
            range.index,
            range.start,
            range.end,
            buffer.len()
        );

        Ok(Bytes::from(buffer))
    }
}
