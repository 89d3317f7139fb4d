use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string in the format "250ms", "30s", "10m", "5h", "3d".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("Missing duration unit in '{}'. Use 'ms', 's', 'm', 'h', or 'd'.", s))?;
    let (value_str, unit) = s.split_at(split_at);

    let value = u64::from_str(value_str)
        .map_err(|_| format!("Invalid numeric value in duration: '{}'", value_str))?;

    let millis = match unit {
        "ms" => Some(value),
        "s" => value.checked_mul(1_000),
        "m" => value.checked_mul(60_000),
        "h" => value.checked_mul(3_600_000),
        "d" => value.checked_mul(86_400_000),
        _ => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
                unit
            ))
        }
    };

    millis
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration '{}' is too large", s))
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
///
/// `"PERF, BURGER,,NOODLE"` becomes `["PERF", "BURGER", "NOODLE"]`.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a comma-separated header string with support for escaped commas.
///
/// Use `\,` to include a literal comma in a header value.
/// Example: "X-Run-Id:perf-1,Accept-Language:ko\,en"
pub fn parse_headers_with_escapes(headers_str: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current = String::new();
    let mut chars = headers_str.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => {
                if !current.trim().is_empty() {
                    headers.push(std::mem::take(&mut current));
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() {
        headers.push(current);
    }

    headers
}
