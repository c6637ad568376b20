// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use crate::common::{DEFAULT_EMIT_INTERVAL_MS, DEFAULT_SAMPLE_INTERVAL_MS};
use crate::persistence::DEFAULT_CHECKPOINT_MAX_AGE_HOURS;
use crate::uploader::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_THRESHOLD};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 持久化配置
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片大小（字节，默认 2MB）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 超过该大小才分片上传（字节，默认 20MB）
    #[serde(default = "default_min_chunk_threshold")]
    pub min_chunk_threshold: u64,
    /// 连接超时（秒）；单次请求不设整体超时
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 进度估算配置
    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_min_chunk_threshold() -> u64 {
    DEFAULT_MIN_CHUNK_THRESHOLD
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunk_threshold: default_min_chunk_threshold(),
            connect_timeout_secs: default_connect_timeout_secs(),
            progress: ProgressConfig::default(),
        }
    }
}

impl UploadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 进度估算配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// 测速窗口样本数
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// EMA 平滑系数，取值 (0, 1]
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// 采样最小间隔（毫秒）
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// 进度回调最小间隔（毫秒）
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,
}

fn default_window_size() -> usize {
    8
}

fn default_smoothing_alpha() -> f64 {
    0.3
}

fn default_sample_interval_ms() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_MS
}

fn default_emit_interval_ms() -> u64 {
    DEFAULT_EMIT_INTERVAL_MS
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            smoothing_alpha: default_smoothing_alpha(),
            sample_interval_ms: default_sample_interval_ms(),
            emit_interval_ms: default_emit_interval_ms(),
        }
    }
}

/// 持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// 断点文件目录
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// 断点有效期（小时）
    #[serde(default = "default_checkpoint_max_age_hours")]
    pub checkpoint_max_age_hours: u64,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_checkpoint_max_age_hours() -> u64 {
    DEFAULT_CHECKPOINT_MAX_AGE_HOURS as u64
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_max_age_hours: default_checkpoint_max_age_hours(),
        }
    }
}

impl AppConfig {
    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size == 0 {
            anyhow::bail!("upload.chunk_size 不能为 0");
        }

        let alpha = self.upload.progress.smoothing_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            anyhow::bail!("upload.progress.smoothing_alpha 必须在 (0, 1] 之间，当前: {}", alpha);
        }

        if self.upload.progress.window_size == 0 {
            anyhow::bail!("upload.progress.window_size 不能为 0");
        }

        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("配置文件校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 只在文件不存在时写出默认配置，不覆盖写错的配置文件
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}
