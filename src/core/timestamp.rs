//! 时间戳换算
//!
//! 设备端 `touch -t` 使用 `YYYYMMDDHHmm.SS`，不带时区。推送时把本地时间
//! 转为 UTC 再加上该时刻的本地偏移（假设设备与本机处于同一时区）；
//! 拉取时列表中的时间直接按本地时间解释，不做修正。两个方向并不对称，
//! 保持现状。

use chrono::{DateTime, Local, NaiveDateTime, Offset, TimeDelta, TimeZone};
use std::time::SystemTime;
use tracing::debug;

/// `touch -t` 时间格式
pub const DEVICE_STAMP_FORMAT: &str = "%Y%m%d%H%M.%S";

/// `ls -l` 输出中的日期 + 时间格式
const LISTING_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// 本地修改时间 -> 设备 touch 参数
pub fn to_device_stamp<Tz: TimeZone>(modified: &DateTime<Tz>) -> String {
    let offset = TimeDelta::seconds(i64::from(modified.offset().fix().local_minus_utc()));
    (modified.naive_utc() + offset)
        .format(DEVICE_STAMP_FORMAT)
        .to_string()
}

/// 解析列表中的日期和时间，按本地时间解释
///
/// 无法解析（或落在夏令时空档）时返回当前时间。
pub fn parse_listing_time(date: &str, time: &str) -> DateTime<Local> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), LISTING_TIME_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| {
            debug!("无法解析列表时间 '{} {}'，使用当前时间", date, time);
            Local::now()
        })
}

/// 文件系统时间 -> 本地时间
pub fn from_system_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

/// 本地时间 -> filetime，用于设置本地文件修改时间
pub fn to_file_time(time: &DateTime<Local>) -> filetime::FileTime {
    filetime::FileTime::from_system_time(SystemTime::from(*time))
}
