//! 大小、速度、剩余时间的显示格式

/// 无法估算剩余时间时的显示文本
pub const ETA_INDETERMINATE: &str = "计算中...";

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// 格式化文件大小，保留两位小数
///
/// ```ignore
/// assert_eq!(format_file_size(1536.0), "1.5 KB");
/// ```
pub fn format_file_size(bytes: f64) -> String {
    if !bytes.is_finite() || bytes <= 0.0 {
        return "0 Bytes".to_string();
    }

    let k = 1024f64;
    let exponent = (bytes.ln() / k.ln()).floor();
    let index = exponent.clamp(0.0, (SIZE_UNITS.len() - 1) as f64) as usize;

    let value = bytes / k.powi(index as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[index])
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_file_size(bytes_per_sec))
}

/// 格式化剩余时间
///
/// - 小于 1 分钟：`45秒`
/// - 小于 1 小时：`3分12秒`
/// - 其余：`1小时5分`
/// - None / 非有限值：`计算中...`
pub fn format_eta(seconds: Option<f64>) -> String {
    let seconds = match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => s.round() as u64,
        _ => return ETA_INDETERMINATE.to_string(),
    };

    if seconds < 60 {
        format!("{}秒", seconds)
    } else if seconds < 3600 {
        format!("{}分{}秒", seconds / 60, seconds % 60)
    } else {
        format!("{}小时{}分", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0.0), "0 Bytes");
        assert_eq!(format_file_size(512.0), "512 Bytes");
        assert_eq!(format_file_size(1024.0), "1 KB");
        assert_eq!(format_file_size(1536.0), "1.5 KB");
        assert_eq!(format_file_size(2.0 * 1024.0 * 1024.0), "2 MB");
        assert_eq!(format_file_size(1234567.0), "1.18 MB");
        assert_eq!(format_file_size(3.0 * 1024f64.powi(3)), "3 GB");
        // 超过 GB 仍以 GB 显示
        assert_eq!(format_file_size(2048.0 * 1024f64.powi(3)), "2048 GB");
    }

    #[test]
    fn test_format_file_size_edge_values() {
        assert_eq!(format_file_size(f64::NAN), "0 Bytes");
        assert_eq!(format_file_size(f64::INFINITY), "0 Bytes");
        assert_eq!(format_file_size(0.5), "0.5 Bytes");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1536.0), "1.5 KB/s");
    }

    #[test]
    fn test_format_eta_buckets() {
        assert_eq!(format_eta(Some(0.0)), "0秒");
        assert_eq!(format_eta(Some(45.4)), "45秒");
        assert_eq!(format_eta(Some(192.0)), "3分12秒");
        assert_eq!(format_eta(Some(3900.0)), "1小时5分");
    }

    #[test]
    fn test_format_eta_indeterminate() {
        assert_eq!(format_eta(None), ETA_INDETERMINATE);
        assert_eq!(format_eta(Some(f64::INFINITY)), ETA_INDETERMINATE);
        assert_eq!(format_eta(Some(f64::NAN)), ETA_INDETERMINATE);
    }
}
