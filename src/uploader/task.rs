// 上传状态定义

use crate::uploader::error::UploadError;
use crate::uploader::progress::ProgressReport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 传输阶段
///
/// `Init → Planning → (SingleShot | Sequential) → Complete`，
/// 失败进入 `Failed`，取消进入 `Cancelled`，两者都保留断点
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    /// 未开始
    Init,
    /// 读取文件信息、计算分片、查找断点
    Planning,
    /// 整文件一次上传
    SingleShot,
    /// 逐个分片上传
    Sequential,
    /// 已完成
    Complete,
    /// 失败
    Failed {
        /// 重新调用能否从断点继续
        resumable: bool,
    },
    /// 已取消
    Cancelled,
}

impl TransferPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TransferPhase::Planning | TransferPhase::SingleShot | TransferPhase::Sequential
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Complete | TransferPhase::Failed { .. } | TransferPhase::Cancelled
        )
    }
}

/// 状态消息标签
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Uploading,
    Success,
    Error,
}

/// 上传状态
///
/// 未注册进度回调时，编排器把进度写到这里供调用方轮询
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadState {
    pub phase: TransferPhase,
    /// 进度百分比 (0-100)
    pub percent: u32,
    pub speed_text: String,
    pub eta_text: String,
    pub is_uploading: bool,
    /// 存在可续传的断点
    pub can_resume: bool,
    /// 最近一次上传的文件（用于"重新上传"）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_file: Option<PathBuf>,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for UploadState {
    fn default() -> Self {
        Self {
            phase: TransferPhase::Init,
            percent: 0,
            speed_text: String::new(),
            eta_text: String::new(),
            is_uploading: false,
            can_resume: false,
            last_file: None,
            error: None,
        }
    }
}

impl UploadState {
    /// 开始一次新的上传尝试
    pub fn begin(&mut self, path: &Path) {
        self.phase = TransferPhase::Planning;
        self.percent = 0;
        self.speed_text.clear();
        self.eta_text.clear();
        self.is_uploading = true;
        self.can_resume = false;
        self.last_file = Some(path.to_path_buf());
        self.error = None;
    }

    pub fn enter(&mut self, phase: TransferPhase) {
        self.phase = phase;
    }

    pub fn apply_progress(&mut self, report: &ProgressReport) {
        self.percent = report.percent;
        self.speed_text = report.speed_text.clone();
        self.eta_text = report.eta_text.clone();
    }

    pub fn mark_completed(&mut self) {
        self.phase = TransferPhase::Complete;
        self.percent = 100;
        self.is_uploading = false;
        self.can_resume = false;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: &UploadError, resumable: bool) {
        self.phase = TransferPhase::Failed { resumable };
        self.is_uploading = false;
        self.can_resume = resumable;
        self.error = Some(error.to_string());
    }

    pub fn mark_cancelled(&mut self, resumable: bool) {
        self.phase = TransferPhase::Cancelled;
        self.is_uploading = false;
        self.can_resume = resumable;
        self.error = Some(UploadError::Aborted.to_string());
    }
}
