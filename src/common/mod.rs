// 公共模块：进度节流、显示格式

pub mod format;
pub mod throttle;

pub use format::{format_eta, format_file_size, format_speed, ETA_INDETERMINATE};
pub use throttle::{ProgressThrottler, DEFAULT_EMIT_INTERVAL_MS, DEFAULT_SAMPLE_INTERVAL_MS};
