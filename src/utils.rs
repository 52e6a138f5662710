use chrono::{Local, TimeZone, Utc};
use uuid::Uuid;

/// 当前时间（Unix 秒）
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// 把 Unix 秒格式化成本地时间，无法表示时原样输出数字
pub fn format_timestamp(secs: i64) -> String {
    match Local.timestamp_opt(secs, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

/// 生成一个随机卷 ID
pub fn new_volume_id() -> [u8; 16] {
    *Uuid::new_v4().as_bytes()
}

/// 默认签名：当前系统用户名
pub fn default_signature() -> String {
    whoami::username()
}

/// 解析带单位的大小：`600MB`、`10KB`、`2GB`、`500B` 或纯数字（字节），单位按 1000 进位
pub fn parse_size(input: &str) -> Result<u64, String> {
    let text = input.trim();
    let upper = text.to_ascii_uppercase();
    let units = [
        ("GB", 1_000_000_000u64),
        ("MB", 1_000_000),
        ("KB", 1_000),
        ("B", 1),
    ];
    let (digits, multiplier) = units
        .iter()
        .find_map(|&(unit, mul)| upper.strip_suffix(unit).map(|d| (d.trim_end(), mul)))
        .unwrap_or((upper.as_str(), 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {:?}", input))?;
    value
        .checked_mul(multiplier)
        .filter(|&bytes| bytes > 0)
        .ok_or_else(|| format!("invalid size: {:?}", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_with_units() {
        assert_eq!(parse_size("600MB"), Ok(600_000_000));
        assert_eq!(parse_size("10kb"), Ok(10_000));
        assert_eq!(parse_size("2GB"), Ok(2_000_000_000));
        assert_eq!(parse_size("500B"), Ok(500));
        assert_eq!(parse_size("1234"), Ok(1234));
        assert_eq!(parse_size(" 3 MB "), Ok(3_000_000));
    }

    #[test]
    fn bad_sizes() {
        for bad in ["", "MB", "0", "-5MB", "1.5MB", "12XB"] {
            assert!(parse_size(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(format_timestamp(now_timestamp()).len(), 19);
    }
}
