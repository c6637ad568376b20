//! 断点续传存储
//!
//! 在键值后端之上实现校验规则：
//! - 文件标识不一致、超过有效期、上传地址变化时，断点作废并清除
//! - 记录无法解析时视为不存在，同时清除
//! - 保存/清除失败只记录警告，不影响上传（断点只是建议性的）

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::backend::{CheckpointBackend, FileBackend};
use super::types::Checkpoint;
use crate::config::PersistenceConfig;
use crate::uploader::{Destination, FileIdentity, UploadError};

/// 断点存储键前缀
pub const CHECKPOINT_KEY_PREFIX: &str = "upload_progress_";

/// 旧版未分文件的断点键（只清理，不再写入）
pub const LEGACY_CHECKPOINT_KEY: &str = "upload_progress";

/// 断点有效期: 24 小时
pub const DEFAULT_CHECKPOINT_MAX_AGE_HOURS: i64 = 24;

/// 断点存储
pub struct ResumeStore {
    backend: Arc<dyn CheckpointBackend>,
    max_age: Duration,
}

impl ResumeStore {
    pub fn new(backend: Arc<dyn CheckpointBackend>) -> Self {
        Self {
            backend,
            max_age: Duration::hours(DEFAULT_CHECKPOINT_MAX_AGE_HOURS),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// 根据持久化配置创建文件存储
    pub fn from_config(config: &PersistenceConfig) -> Self {
        let backend = FileBackend::new(&config.checkpoint_dir);
        Self::new(Arc::new(backend))
            .with_max_age(Duration::hours(config.checkpoint_max_age_hours as i64))
    }

    /// 存储键：`upload_progress_{fileIdentity}`
    pub fn storage_key(identity: &FileIdentity) -> String {
        format!("{}{}", CHECKPOINT_KEY_PREFIX, identity.key())
    }

    /// 严格查找
    ///
    /// 只有文件标识一致、未过期、且上传地址与当前一致时才返回断点；
    /// 其余情况返回 None 并清除该文件的断点
    pub fn lookup(&self, identity: &FileIdentity, destination: &Destination) -> Option<Checkpoint> {
        let checkpoint = self.load_valid(identity)?;

        if checkpoint.upload_url != destination.upload_url {
            warn!(
                "upload_url 不匹配，可能是新的上传会话，清除旧断点: file={}",
                identity
            );
            self.clear(identity);
            return None;
        }

        debug!(
            "找到断点: file={}, 已确认分片={}/{}",
            identity,
            checkpoint.next_chunk(),
            checkpoint.total_chunks
        );
        Some(checkpoint)
    }

    /// 宽松查找（仅按文件标识）
    ///
    /// 用于在拿到新的上传地址之前提示"存在未完成的上传"；
    /// 真正续传前仍需调用 [`lookup`](Self::lookup) 做严格校验
    pub fn has_prior_attempt(&self, identity: &FileIdentity) -> Option<Checkpoint> {
        self.load_valid(identity)
    }

    /// 覆盖保存断点
    pub fn save(&self, checkpoint: &Checkpoint) {
        let key = format!("{}{}", CHECKPOINT_KEY_PREFIX, checkpoint.file_identity);
        let value = match serde_json::to_string(checkpoint) {
            Ok(v) => v,
            Err(e) => {
                warn!("序列化断点失败: key={}, 错误: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.backend.put(&key, &value) {
            warn!("保存断点失败: key={}, 错误: {}", key, e);
        }
    }

    /// 清除断点
    pub fn clear(&self, identity: &FileIdentity) {
        let key = Self::storage_key(identity);
        if let Err(e) = self.backend.delete(&key) {
            warn!("清除断点失败: key={}, 错误: {}", key, e);
        }
    }

    /// 清理旧版单键断点记录
    pub fn sweep_legacy(&self) -> bool {
        match self.backend.delete(LEGACY_CHECKPOINT_KEY) {
            Ok(true) => {
                info!("已清理旧版断点记录: {}", LEGACY_CHECKPOINT_KEY);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("清理旧版断点记录失败: {}", e);
                false
            }
        }
    }

    /// 读取并做标识、有效期校验
    fn load_valid(&self, identity: &FileIdentity) -> Option<Checkpoint> {
        let checkpoint = match self.load(identity) {
            Ok(Some(c)) => c,
            Ok(None) => return None,
            Err(e) => {
                warn!("{}，按无断点处理: file={}", e, identity);
                self.clear(identity);
                return None;
            }
        };

        if checkpoint.file_identity != identity.key() {
            warn!(
                "断点文件标识不匹配 ({} != {})，清除",
                checkpoint.file_identity, identity
            );
            self.clear(identity);
            return None;
        }

        // load 已校验时间戳可表示
        let age = checkpoint.age(Utc::now()).unwrap_or_else(Duration::zero);
        if age < Duration::zero() {
            warn!(
                "断点时间戳晚于当前时间（时钟回拨或记录被修改），清除: file={}",
                identity
            );
            self.clear(identity);
            return None;
        }

        if age >= self.max_age {
            info!(
                "断点记录已过期(超过{}小时): file={}",
                self.max_age.num_hours(),
                identity
            );
            self.clear(identity);
            return None;
        }

        Some(checkpoint)
    }

    fn load(&self, identity: &FileIdentity) -> Result<Option<Checkpoint>, UploadError> {
        let key = Self::storage_key(identity);
        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("读取断点失败: key={}, 错误: {}", key, e);
                return Ok(None);
            }
        };

        let checkpoint: Checkpoint = serde_json::from_str(&raw)
            .map_err(|e| UploadError::StorageCorruption(e.to_string()))?;
        checkpoint.check_consistency()?;
        Ok(Some(checkpoint))
    }
}
