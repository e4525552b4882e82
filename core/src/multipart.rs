//! Line-oriented multipart framing helpers.
//!
//! The decoder works on the physical body as a list of raw lines (CRLF
//! stripped). Parts are found by comparing whole lines against the `--<b>`
//! delimiter; nothing here looks inside a part.

use once_cell::sync::Lazy;
use regex::Regex;

/// Line terminator used for everything this crate serializes.
pub const CRLF: &str = "\r\n";

static MULTIPART_CONTENT_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*content-type\s*:\s*multipart/mixed\s*;.*?\bboundary\s*=\s*"?([^";\s]+)"?"#)
        .unwrap()
});

/// Split a physical body into raw lines.
///
/// Lines are separated by LF; a CR directly before it is dropped. A trailing
/// terminator does not produce an extra empty line.
pub fn split_lines(body: &str) -> Vec<String> {
    let body = body.strip_suffix('\n').unwrap_or(body);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Boundary parameter of a `Content-Type: multipart/mixed; boundary=<b>` value.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    MULTIPART_CONTENT_TYPE
        .captures(&format!("Content-Type: {value}"))
        .map(|caps| caps[1].to_string())
}

/// Locate the first `Content-Type: multipart/mixed; boundary=<b>` header line.
///
/// Returns the line index and the boundary. The first declaration wins, wherever
/// it appears.
pub fn find_nested_boundary(lines: &[String]) -> Option<(usize, String)> {
    lines.iter().enumerate().find_map(|(index, line)| {
        MULTIPART_CONTENT_TYPE
            .captures(line)
            .map(|caps| (index, caps[1].to_string()))
    })
}

/// Boundary of the first line that looks like a part delimiter (`--<b>`).
pub fn discover_boundary(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let boundary = line.trim_end().strip_prefix("--")?;
        let boundary = boundary.strip_suffix("--").unwrap_or(boundary);
        (!boundary.is_empty()).then(|| boundary.to_string())
    })
}

/// Split `lines` into the parts delimited by `--<boundary>`.
///
/// Preamble before the first delimiter and epilogue after `--<boundary>--` are
/// dropped, as are blank lines at the start of each part. Trailing whitespace
/// on delimiter lines is tolerated.
pub fn split_parts<'a>(lines: &'a [String], boundary: &str) -> Vec<&'a [String]> {
    let open = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    for (index, line) in lines.iter().enumerate() {
        let line = line.trim_end();
        let is_close = line == close;
        if !is_close && line != open {
            continue;
        }
        if let Some(begin) = start.take() {
            parts.push(trim_leading_blank(&lines[begin..index]));
        }
        if is_close {
            break;
        }
        start = Some(index + 1);
    }
    // A missing closing delimiter still yields the last part.
    if let Some(begin) = start {
        parts.push(trim_leading_blank(&lines[begin..]));
    }
    tracing::trace!(boundary, parts = parts.len(), "split multipart body");
    parts
}

fn trim_leading_blank(lines: &[String]) -> &[String] {
    let skip = lines.iter().take_while(|l| l.trim().is_empty()).count();
    &lines[skip..]
}
