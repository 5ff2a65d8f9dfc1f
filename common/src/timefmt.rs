//! Korean-locale time formatting (all wall-clock output is in KST).

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc, Weekday};

/// Shown in place of an absent or unparseable history timestamp.
pub const NO_DATE_INFO: &str = "날짜 정보 없음";

/// Korea Standard Time (UTC+9, no DST).
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Chat-style "time since" label.
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - ts).num_minutes();
    if minutes < 1 {
        "방금 전".to_string()
    } else if minutes < 60 {
        format!("{minutes}분 전")
    } else if minutes < 1440 {
        format!("{}시간 전", minutes / 60)
    } else {
        ts.with_timezone(&kst()).format("%-m월 %-d일 %H:%M").to_string()
    }
}

/// Parse a backend timestamp: RFC 3339, or a naive ISO datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `YYYY년 M월 D일 HH:MM` for a history entry.
pub fn format_history_date(raw: Option<&str>) -> String {
    raw.and_then(parse_timestamp)
        .map(|dt| dt.with_timezone(&kst()).format("%Y년 %-m월 %-d일 %H:%M").to_string())
        .unwrap_or_else(|| NO_DATE_INFO.to_string())
}

/// `YYYY년 M월 D일` for a plain `YYYY-MM-DD` date; the input is returned
/// unchanged when it does not parse.
pub fn format_long_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y년 %-m월 %-d일").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Header badge: `YYYY.MM.DD 요일` in KST.
pub fn today_kst(now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&kst());
    format!("{} {}", local.format("%Y.%m.%d"), weekday_ko(local.weekday()))
}

fn weekday_ko(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월요일",
        Weekday::Tue => "화요일",
        Weekday::Wed => "수요일",
        Weekday::Thu => "목요일",
        Weekday::Fri => "금요일",
        Weekday::Sat => "토요일",
        Weekday::Sun => "일요일",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap()
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = at(12, 0);
        assert_eq!(relative_time(now - Duration::seconds(30), now), "방금 전");
        assert_eq!(relative_time(now + Duration::minutes(2), now), "방금 전");
        assert_eq!(relative_time(now - Duration::minutes(59), now), "59분 전");
        assert_eq!(relative_time(now - Duration::minutes(150), now), "2시간 전");
        // 2024-03-03 12:00 UTC is 21:00 KST.
        assert_eq!(relative_time(now - Duration::days(2), now), "3월 3일 21:00");
    }

    #[test]
    fn test_history_date() {
        assert_eq!(
            format_history_date(Some("2024-03-05T15:30:00+00:00")),
            "2024년 3월 6일 00:30"
        );
        assert_eq!(format_history_date(Some("2024-03-05T01:02:03.456")), "2024년 3월 5일 10:02");
        assert_eq!(format_history_date(Some("yesterday")), NO_DATE_INFO);
        assert_eq!(format_history_date(None), NO_DATE_INFO);
    }

    #[test]
    fn test_today_kst_rolls_over_midnight() {
        // 2024-03-05 (Tue) 16:00 UTC is Wednesday 01:00 in Seoul.
        assert_eq!(today_kst(at(16, 0)), "2024.03.06 수요일");
    }

    #[test]
    fn test_long_date() {
        assert_eq!(format_long_date("2024-12-31"), "2024년 12월 31일");
        assert_eq!(format_long_date("soon"), "soon");
    }
}
