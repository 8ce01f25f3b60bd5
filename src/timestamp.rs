//! Timestamps for access log line prefixes

use time::OffsetDateTime;

/// Renders the current instant in UTC or local time.
///
/// Falls back to UTC when the local offset cannot be determined.
pub fn timestamp(utc: bool) -> String {
    let now = if utc {
        OffsetDateTime::now_utc()
    } else {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    };
    format_timestamp(now, utc)
}

/// Renders `now` as `2024-05-29 10:53:19.123 +0000`, with a trailing ` UTC` zone name when
/// `utc` is set. The fractional part is omitted when zero and has no trailing zeros.
pub fn format_timestamp(now: OffsetDateTime, utc: bool) -> String {
    let now = if utc {
        now.to_offset(time::UtcOffset::UTC)
    } else {
        now
    };

    let fraction = match now.nanosecond() {
        0 => String::new(),
        nanos => format!(".{nanos:09}").trim_end_matches('0').to_owned(),
    };

    let offset = now.offset();
    let sign = if offset.is_negative() { '-' } else { '+' };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{fraction} {sign}{:02}{:02}{}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        offset.whole_hours().unsigned_abs(),
        offset.minutes_past_hour().unsigned_abs(),
        if utc { " UTC" } else { "" },
    )
}
