//! 日志系统配置
//!
//! 支持控制台输出和文件持久化，按文件大小和启动时间滚动，自动清理过期日志

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "resumable-upload.";

const LOG_FILE_SUFFIX: &str = ".log";

/// 滚动日志文件
///
/// 文件名：`resumable-upload.{启动时间}.log`，超过大小上限后依次写入
/// `resumable-upload.{启动时间}_1.log`、`_2.log` ...
struct RollingFile {
    /// 启动时间戳（YYYY-MM-DD-HHMMSS）
    start_timestamp: String,
    log_dir: PathBuf,
    current_file: Option<File>,
    /// 0 为基础文件
    current_index: u32,
    max_file_size: u64,
    current_size: u64,
}

impl RollingFile {
    fn open(log_dir: PathBuf, max_file_size: u64, start_timestamp: String) -> io::Result<Self> {
        let mut rolling = Self {
            start_timestamp,
            log_dir,
            current_file: None,
            current_index: 0,
            max_file_size,
            current_size: 0,
        };
        rolling.open_current()?;
        Ok(rolling)
    }

    fn file_path(&self, index: u32) -> PathBuf {
        let filename = if index == 0 {
            format!("{}{}{}", LOG_FILE_PREFIX, self.start_timestamp, LOG_FILE_SUFFIX)
        } else {
            format!(
                "{}{}_{}{}",
                LOG_FILE_PREFIX, self.start_timestamp, index, LOG_FILE_SUFFIX
            )
        };
        self.log_dir.join(filename)
    }

    fn open_current(&mut self) -> io::Result<()> {
        let path = self.file_path(self.current_index);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        // 追加到已有文件时从已有大小继续计数
        self.current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.current_file = Some(file);
        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 空文件总是接收第一条记录，单条超长日志不会反复滚动
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_file_size {
            if let Some(mut file) = self.current_file.take() {
                file.flush()?;
            }
            self.current_index += 1;
            self.open_current()?;
        }

        let file = self
            .current_file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件未打开"))?;
        let written = file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current_file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// 日志文件写入器
///
/// 实现 Write，交给 tracing_appender 的非阻塞写线程使用
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<RollingFile>>,
}

impl LogFileManager {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let start_timestamp = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        Self::with_timestamp(log_dir, max_file_size, start_timestamp)
    }

    fn with_timestamp(
        log_dir: PathBuf,
        max_file_size: u64,
        start_timestamp: String,
    ) -> io::Result<Self> {
        let rolling = RollingFile::open(log_dir, max_file_size, start_timestamp)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(rolling)),
        })
    }

    /// 当前写入的文件
    pub fn current_path(&self) -> PathBuf {
        let inner = self.inner.lock();
        inner.file_path(inner.current_index)
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_data(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// 日志目录不可用时回退到仅控制台输出，不会阻止程序启动
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(true);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    }

    let file_manager = match fs::create_dir_all(&config.log_dir)
        .and_then(|_| LogFileManager::new(config.log_dir.clone(), config.max_file_size))
    {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!(
                "创建日志文件失败: {:?}, 错误: {}，回退到仅控制台输出",
                config.log_dir, e
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            return LogGuard { _file_guard: None };
        }
    };

    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_manager);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
        config.log_dir,
        config.retention_days,
        config.level,
        config.max_file_size as f64 / 1024.0 / 1024.0
    );

    let deleted = cleanup_old_logs(&config.log_dir, config.retention_days, Local::now().date_naive());
    if deleted > 0 {
        info!("已清理 {} 个过期日志文件", deleted);
    }

    LogGuard {
        _file_guard: Some(file_guard),
    }
}

/// 清理过期日志文件，返回删除数量
///
/// 优先按文件名中的日期判断；文件名无法解析时按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) if name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX) => {
                name
            }
            _ => continue,
        };

        let expired = match date_from_filename(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => expired_by_modified_time(&entry, retention),
        };

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted += 1;
                    tracing::debug!("已删除过期日志文件: {:?}", path);
                }
                Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
            }
        }
    }

    deleted
}

/// 从文件名中提取日期
///
/// - resumable-upload.YYYY-MM-DD-HHMMSS.log
/// - resumable-upload.YYYY-MM-DD-HHMMSS_N.log
fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    let name = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    let date = name.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn expired_by_modified_time(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    let modified = match entry.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    let modified: chrono::DateTime<chrono::Utc> = modified.into();
    chrono::Utc::now().signed_duration_since(modified) > retention
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.level, "info");
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
    }

    #[test]
    fn test_date_from_filename() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(
            date_from_filename("resumable-upload.2024-03-09-101500.log"),
            expected
        );
        assert_eq!(
            date_from_filename("resumable-upload.2024-03-09-101500_3.log"),
            expected
        );
        assert_eq!(date_from_filename("resumable-upload.garbage.log"), None);
        assert_eq!(date_from_filename("other.2024-03-09-101500.log"), None);
    }

    #[test]
    fn test_rolls_over_when_full() {
        let dir = TempDir::new().unwrap();
        let mut manager = LogFileManager::with_timestamp(
            dir.path().to_path_buf(),
            16,
            "2024-03-09-101500".to_string(),
        )
        .unwrap();

        manager.write_all(b"0123456789\n").unwrap();
        manager.write_all(b"0123456789\n").unwrap();
        manager.write_all(b"0123456789\n").unwrap();
        manager.flush().unwrap();

        assert_eq!(
            manager.current_path(),
            dir.path().join("resumable-upload.2024-03-09-101500_2.log")
        );
        let first =
            fs::read_to_string(dir.path().join("resumable-upload.2024-03-09-101500.log")).unwrap();
        assert_eq!(first, "0123456789\n");
    }

    #[test]
    fn test_cleanup_old_logs() {
        let dir = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();

        let old = dir.path().join("resumable-upload.2024-03-01-080000.log");
        let old_rolled = dir.path().join("resumable-upload.2024-03-01-080000_1.log");
        let recent = dir.path().join("resumable-upload.2024-03-18-080000.log");
        let unrelated = dir.path().join("notes.2024-01-01-080000.log");
        for path in [&old, &old_rolled, &recent, &unrelated] {
            fs::write(path, "x").unwrap();
        }

        assert_eq!(cleanup_old_logs(dir.path(), 7, today), 2);
        assert!(!old.exists());
        assert!(!old_rolled.exists());
        assert!(recent.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert_eq!(
            cleanup_old_logs(Path::new("/definitely/not/a/log/dir"), 7, today),
            0
        );
    }
}
