// 上传进度估算
//
// 滑动窗口测速 + 指数移动平均（EMA）平滑：
// - 采样节流：距上次采样不足 sample_interval 的更新直接丢弃
// - 窗口速度：窗口首尾样本的 Δbytes/Δt；样本不足两个时退化为本次会话平均速度
// - 速度与剩余时间分别做 EMA，首个原始值作为初值
// - 回调节流：emit_interval 内最多回调一次，完成时强制回调 100%
//
// 样本中的字节数是"本次会话"发送的字节，续传时已确认的字节不计入速度

use crate::common::{format_eta, format_speed, ProgressThrottler};
use crate::config::ProgressConfig;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// 进度回调
pub type ProgressSink = Arc<dyn Fn(&ProgressReport) + Send + Sync>;

/// 测速样本
#[derive(Debug, Clone, Copy)]
pub struct SpeedSample {
    pub at: Instant,
    /// 本次会话已发送字节数
    pub session_bytes: u64,
}

/// 一次进度回调的内容
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// 百分比 (0-100)
    pub percent: u32,
    /// 累计已发送字节（含续传前已确认部分）
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// 平滑后的速度 (bytes/s)
    pub speed: f64,
    pub speed_text: String,
    /// 平滑后的剩余时间（秒），无法估算时为 None
    pub eta_secs: Option<f64>,
    pub eta_text: String,
}

/// 进度估算器
///
/// 每次上传尝试一个实例；同一实例复用时先调用 [`reset`](Self::reset)
pub struct ProgressEstimator {
    total_bytes: u64,
    /// 本次会话开始时已确认的字节数
    session_base: u64,
    session_start: Instant,
    last_bytes: u64,

    window: VecDeque<SpeedSample>,
    window_size: usize,
    alpha: f64,
    smoothed_speed: Option<f64>,
    smoothed_eta: Option<f64>,

    sample_throttle: ProgressThrottler,
    emit_throttle: ProgressThrottler,
    sink: Option<ProgressSink>,
}

impl ProgressEstimator {
    pub fn new(config: &ProgressConfig, total_bytes: u64, session_base: u64, now: Instant) -> Self {
        let window_size = config.window_size.max(1);
        Self {
            total_bytes,
            session_base,
            session_start: now,
            last_bytes: session_base,
            window: VecDeque::with_capacity(window_size + 1),
            window_size,
            alpha: config.smoothing_alpha,
            smoothed_speed: None,
            smoothed_eta: None,
            sample_throttle: ProgressThrottler::with_millis(config.sample_interval_ms),
            emit_throttle: ProgressThrottler::with_millis(config.emit_interval_ms),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: ProgressSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 输入累计已发送字节数
    ///
    /// 只有采样节流和回调节流都放行时才生成报告并回调
    pub fn ingest(&mut self, cumulative_bytes: u64, now: Instant) -> Option<ProgressReport> {
        let cumulative_bytes = cumulative_bytes.min(self.total_bytes);
        self.last_bytes = cumulative_bytes;

        if !self.sample_throttle.should_emit(now) {
            return None;
        }

        let session_bytes = cumulative_bytes.saturating_sub(self.session_base);
        self.window.push_back(SpeedSample {
            at: now,
            session_bytes,
        });
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        if let Some(raw) = self.raw_speed(session_bytes, now) {
            self.smoothed_speed = Some(self.smooth(self.smoothed_speed, raw));
        }
        self.update_eta(cumulative_bytes);

        if !self.emit_throttle.should_emit(now) {
            return None;
        }

        let report = self.report(cumulative_bytes);
        self.dispatch(&report);
        Some(report)
    }

    /// 完成时强制回调 100%
    pub fn finish(&mut self, now: Instant) -> ProgressReport {
        self.last_bytes = self.total_bytes;
        self.smoothed_eta = Some(0.0);
        self.emit_throttle.force_emit(now);

        let report = self.report(self.total_bytes);
        self.dispatch(&report);
        report
    }

    /// 开始新的会话，清空窗口、平滑状态和节流器
    pub fn reset(&mut self, session_base: u64, now: Instant) {
        self.session_base = session_base;
        self.session_start = now;
        self.last_bytes = session_base;
        self.window.clear();
        self.smoothed_speed = None;
        self.smoothed_eta = None;
        self.sample_throttle.reset();
        self.emit_throttle.reset();
    }

    pub fn speed(&self) -> Option<f64> {
        self.smoothed_speed
    }

    pub fn eta(&self) -> Option<f64> {
        self.smoothed_eta
    }

    pub fn bytes_sent(&self) -> u64 {
        self.last_bytes
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    fn raw_speed(&self, session_bytes: u64, now: Instant) -> Option<f64> {
        let raw = match (self.window.front(), self.window.back()) {
            (Some(first), Some(last)) if self.window.len() >= 2 => {
                let elapsed = last.at.saturating_duration_since(first.at).as_secs_f64();
                let delta = last.session_bytes.saturating_sub(first.session_bytes);
                delta as f64 / elapsed
            }
            _ => {
                let elapsed = now.saturating_duration_since(self.session_start).as_secs_f64();
                session_bytes as f64 / elapsed
            }
        };

        raw.is_finite().then_some(raw)
    }

    fn update_eta(&mut self, cumulative_bytes: u64) {
        let remaining = self.total_bytes.saturating_sub(cumulative_bytes) as f64;
        match self.smoothed_speed {
            Some(speed) if speed > 0.0 && speed.is_finite() => {
                let raw = remaining / speed;
                self.smoothed_eta = Some(self.smooth(self.smoothed_eta, raw));
            }
            _ => self.smoothed_eta = None,
        }
    }

    fn smooth(&self, previous: Option<f64>, raw: f64) -> f64 {
        match previous {
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
            None => raw,
        }
    }

    fn report(&self, cumulative_bytes: u64) -> ProgressReport {
        let percent = if self.total_bytes == 0 {
            100
        } else {
            ((cumulative_bytes as f64 / self.total_bytes as f64) * 100.0).floor() as u32
        };
        let speed = self.smoothed_speed.unwrap_or(0.0);

        ProgressReport {
            percent: percent.min(100),
            bytes_sent: cumulative_bytes,
            total_bytes: self.total_bytes,
            speed,
            speed_text: format_speed(speed),
            eta_secs: self.smoothed_eta,
            eta_text: format_eta(self.smoothed_eta),
        }
    }

    fn dispatch(&self, report: &ProgressReport) {
        debug!(
            "上传进度: {}% ({}/{}), 速度={}, 剩余={}",
            report.percent,
            report.bytes_sent,
            report.total_bytes,
            report.speed_text,
            report.eta_text
        );
        if let Some(sink) = &self.sink {
            sink(report);
        }
    }
}
