// 上传错误类型

use thiserror::Error;

/// 上传错误
///
/// 除 `StorageCorruption` 在断点存储内部自愈外，其余错误都会原样返回给调用方
#[derive(Debug, Error)]
pub enum UploadError {
    /// 参数校验失败（分片计划输入非法、文件标识不匹配等）
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 连接级网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 服务器返回非 2xx 状态码
    #[error("分片上传失败: HTTP {status}")]
    HttpStatus { status: u16, body: String },

    /// 调用方主动取消
    #[error("上传已取消")]
    Aborted,

    /// 断点记录无法解析
    #[error("断点记录损坏: {0}")]
    StorageCorruption(String),

    /// 本地文件读取失败
    #[error("读取本地文件失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 上传错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    Validation,
    Network,
    HttpStatus,
    Aborted,
    StorageCorruption,
    Io,
}

impl UploadError {
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::Validation(_) => UploadErrorKind::Validation,
            UploadError::Network(_) => UploadErrorKind::Network,
            UploadError::HttpStatus { .. } => UploadErrorKind::HttpStatus,
            UploadError::Aborted => UploadErrorKind::Aborted,
            UploadError::StorageCorruption(_) => UploadErrorKind::StorageCorruption,
            UploadError::Io(_) => UploadErrorKind::Io,
        }
    }

    /// HTTP 状态码（仅 `HttpStatus` 错误）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl UploadErrorKind {
    /// 重新调用编排器能否从断点继续
    ///
    /// 网络错误、HTTP 错误和取消都会保留断点；参数错误需要调用方修正输入
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            UploadErrorKind::Network
                | UploadErrorKind::HttpStatus
                | UploadErrorKind::Aborted
                | UploadErrorKind::Io
        )
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return UploadError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            };
        }
        UploadError::Network(e.to_string())
    }
}
