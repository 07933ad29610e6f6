//! RFC 5322 header helpers: raw header block, folding, flags and date parsing.
//!
//! `mail-parser` decodes the structured headers; these helpers cover what it
//! does not expose directly (the raw block, mbox status flags, the date on
//! the `From ` separator line).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Return the header block of a message (everything before the first blank line).
pub fn header_block(message: &[u8]) -> &[u8] {
    match find_header_end(message) {
        Some(end) => &message[..end],
        None => message,
    }
}

/// Find the byte offset where headers end (position of the first blank line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    if data.starts_with(b"\n") || data.starts_with(b"\r\n") {
        return Some(0);
    }
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Whether the message was read, from mbox `Status` or `X-Mozilla-Status`.
///
/// `None` when neither header is present.
pub fn read_flag(headers: &[(String, String)]) -> Option<bool> {
    if let Some(status) = get_header(headers, "status") {
        return Some(status.contains('R'));
    }
    let mozilla = get_header(headers, "x-mozilla-status")?;
    let flags = u32::from_str_radix(mozilla.trim(), 16).ok()?;
    Some(flags & 0x0001 != 0)
}

/// Whether the message is marked important, from `Importance` or `X-Priority`.
///
/// `None` when neither header is present.
pub fn importance_flag(headers: &[(String, String)]) -> Option<bool> {
    if let Some(importance) = get_header(headers, "importance") {
        return Some(importance.trim().eq_ignore_ascii_case("high"));
    }
    let priority = get_header(headers, "x-priority")?;
    match priority.trim().chars().next() {
        Some('1') | Some('2') => Some(true),
        Some(_) => Some(false),
        None => None,
    }
}

/// Parse the date carried by an mbox separator line.
///
/// `"From sender@example.com Thu Jan  4 10:00:00 2024"` → 2024-01-04 10:00:00 UTC.
/// The sender token may be missing or contain no `@`.
pub fn separator_date(separator: &str) -> Option<DateTime<Utc>> {
    let rest = separator.strip_prefix("From ")?.trim();
    // Everything after the first whitespace-delimited token is the date.
    let date_part = match rest.split_once(char::is_whitespace) {
        Some((_, date)) => date.trim(),
        None => return None,
    };
    let collapsed = date_part.split_whitespace().collect::<Vec<_>>().join(" ");
    parse_date(&collapsed)
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, asctime (mbox separators), and many broken
/// real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Remove leading day-of-week: "Thu, " or "Thu "
    let no_dow = strip_day_of_week(trimmed);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%b %d %H:%M:%S %z %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];

    for candidate in [no_dow.clone(), replace_named_tz(&no_dow)] {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = [
        "Mon,", "Tue,", "Wed,", "Thu,", "Fri,", "Sat,", "Sun,", "Mon ", "Tue ", "Wed ", "Thu ",
        "Fri ", "Sat ", "Sun ",
    ];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(name) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}
