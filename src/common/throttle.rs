//! 进度节流器
//!
//! 控制采样与进度回调的频率，避免记录近似重复的采样点和界面闪烁。
//! 时间由调用方传入，便于在测试中精确控制

use std::time::{Duration, Instant};

/// 默认采样间隔（毫秒）
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 200;

/// 默认回调间隔（毫秒）
pub const DEFAULT_EMIT_INTERVAL_MS: u64 = 500;

/// 时间间隔节流器
///
/// 典型用法：每次更新进度时调用 `should_emit(now)`，返回 true 时才继续
#[derive(Debug, Clone)]
pub struct ProgressThrottler {
    /// 上次放行的时间
    last_emit: Option<Instant>,
    /// 最小放行间隔
    interval: Duration,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit: None,
            interval,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 距上次放行已超过间隔则放行并记录时间；第一次调用总是放行
    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// 强制放行（用于完成时的最后一次更新）
    pub fn force_emit(&mut self, now: Instant) -> bool {
        self.last_emit = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
