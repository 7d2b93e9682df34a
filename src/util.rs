// DriftClock Formatting Helpers
// Human-readable renderings of clock times and durations

/// Render an hour/minute pair the way the clock face shows it: 12-hour,
/// no leading zero on the hour, `a`/`p` suffix (`12:00a`, `7:05a`, `1:30p`).
pub fn format_clock_time(hour: u32, minute: u32) -> String {
    let (display_hour, suffix) = match hour {
        0 => (12, 'a'),
        1..=11 => (hour, 'a'),
        12 => (12, 'p'),
        _ => (hour - 12, 'p'),
    };
    format!("{}:{:02}{}", display_hour, minute, suffix)
}

/// Render a duration in seconds as `1d 2h 3m`.
///
/// Days and hours are omitted when zero, minutes are always shown and
/// a remainder of 30 seconds or more rounds the minutes up.
pub fn format_minutes(secs: i64) -> String {
    let negative = secs < 0;
    let mut secs = secs.unsigned_abs();

    let days = secs / 86_400;
    secs -= days * 86_400;
    let hours = secs / 3_600;
    secs -= hours * 3_600;
    let mut mins = secs / 60;
    secs -= mins * 60;
    if secs >= 30 {
        mins += 1;
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{}d ", days));
    }
    if hours > 0 {
        out.push_str(&format!("{}h ", hours));
    }
    out.push_str(&format!("{}m", mins));
    out
}

/// Upper-case the first letter of every space-separated word.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock_time() {
        assert_eq!(format_clock_time(0, 0), "12:00a");
        assert_eq!(format_clock_time(7, 5), "7:05a");
        assert_eq!(format_clock_time(11, 59), "11:59a");
        assert_eq!(format_clock_time(12, 0), "12:00p");
        assert_eq!(format_clock_time(13, 30), "1:30p");
        assert_eq!(format_clock_time(23, 45), "11:45p");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(29), "0m");
        assert_eq!(format_minutes(30), "1m");
        assert_eq!(format_minutes(3_600), "1h 0m");
        assert_eq!(format_minutes(86_400 + 2 * 3_600 + 3 * 60), "1d 2h 3m");
        assert_eq!(format_minutes(-90), "-2m");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("partly cloudy"), "Partly Cloudy");
        assert_eq!(title_case("  clear   sky "), "Clear Sky");
        assert_eq!(title_case(""), "");
    }
}
