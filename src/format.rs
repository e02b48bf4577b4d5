use chrono::{DateTime, TimeZone, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 604_800;

/// Relative age of a submission such as "3 hours ago". Timestamps in the
/// future are measured the same way as past ones.
pub fn submission_time(created_utc: f64, now: DateTime<Utc>) -> String {
    let created = Utc
        .timestamp_opt(created_utc.trunc() as i64, 0)
        .single()
        .unwrap_or(now);
    let seconds = (now - created).num_seconds().abs();

    if seconds < MINUTE {
        return "Less than a minute ago".to_string();
    }
    let (amount, unit) = if seconds < HOUR {
        (seconds / MINUTE, "minute")
    } else if seconds < DAY {
        (seconds / HOUR, "hour")
    } else if seconds < WEEK {
        (seconds / DAY, "day")
    } else {
        (seconds / WEEK, "week")
    };
    let plural = if amount > 1 { "s" } else { "" };
    format!("{amount} {unit}{plural} ago")
}

pub fn submission_time_now(created_utc: f64) -> String {
    if created_utc <= 0.0 {
        return String::new();
    }
    submission_time(created_utc, Utc::now())
}

/// Scores and karma in the compact form the header and lists use.
pub fn compact_count(value: i64) -> String {
    let abs = value.unsigned_abs();
    let sign = if value < 0 { "-" } else { "" };
    if abs >= 1_000_000 {
        format!("{sign}{:.1}m", abs as f64 / 1_000_000.0)
    } else if abs >= 10_000 {
        format!("{sign}{}k", abs / 1_000)
    } else if abs >= 1_000 {
        format!("{sign}{:.1}k", abs as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

pub fn plural(count: i64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn relative_times_follow_unit_boundaries() {
        let created = 1_700_000_000.0;
        let base = 1_700_000_000;
        assert_eq!(submission_time(created, at(base + 59)), "Less than a minute ago");
        assert_eq!(submission_time(created, at(base + 60)), "1 minute ago");
        assert_eq!(submission_time(created, at(base + 150)), "2 minutes ago");
        assert_eq!(submission_time(created, at(base + HOUR)), "1 hour ago");
        assert_eq!(submission_time(created, at(base + 5 * HOUR + 10)), "5 hours ago");
        assert_eq!(submission_time(created, at(base + DAY)), "1 day ago");
        assert_eq!(submission_time(created, at(base + 6 * DAY)), "6 days ago");
        assert_eq!(submission_time(created, at(base + WEEK)), "1 week ago");
        assert_eq!(submission_time(created, at(base + 20 * WEEK)), "20 weeks ago");
    }

    #[test]
    fn future_timestamps_use_absolute_difference() {
        assert_eq!(
            submission_time(1_700_000_000.0 + 7200.0, at(1_700_000_000)),
            "2 hours ago"
        );
    }

    #[test]
    fn compact_counts() {
        assert_eq!(compact_count(999), "999");
        assert_eq!(compact_count(1_234), "1.2k");
        assert_eq!(compact_count(45_600), "45k");
        assert_eq!(compact_count(-2_500_000), "-2.5m");
        assert_eq!(plural(1, "comment", "comments"), "1 comment");
        assert_eq!(plural(0, "comment", "comments"), "0 comments");
    }
}
