use chrono::{DateTime, Duration, NaiveDateTime, Utc};

const CST_OFFSET_HOURS: i64 = 8;

/// Parses a `YYYY-MM-DD HH:MM:SS` wall-clock time in China Standard Time (UTC+8), as Alipay sends them. Fractional
/// seconds are accepted.
pub fn parse_china_standard_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive - Duration::hours(CST_OFFSET_HOURS), Utc))
}
