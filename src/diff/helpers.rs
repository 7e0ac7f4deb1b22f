//! Helper functions for diff parsing.

/// Line ranges of a hunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct HunkRange {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

/// Parse the paths from the rest of a "diff --git" line.
///
/// Handles `a/<old> b/<new>`; paths may contain spaces, so the split is at
/// the last " b/". Returns the `-p1` stripped (old, new) paths.
pub(super) fn parse_diff_git_line(rest: &str) -> Option<(String, String)> {
    let b_pos = rest.rfind(" b/")?;
    let old = rest[..b_pos].strip_prefix("a/")?;
    let new = &rest[b_pos + 3..];
    Some((normalize_path(old), normalize_path(new)))
}

/// Parse a hunk header line.
///
/// Format: "@@ -old_start,old_len +new_start,new_len @@ optional context".
/// A missing length means 1.
pub(super) fn parse_hunk_header(line: &str) -> Option<HunkRange> {
    let line = line.strip_prefix("@@ ")?;
    let end_marker = line.find(" @@")?;
    let parts: Vec<&str> = line[..end_marker].split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }

    let (old_start, old_len) = parse_range(parts[0].strip_prefix('-')?)?;
    let (new_start, new_len) = parse_range(parts[1].strip_prefix('+')?)?;

    Some(HunkRange {
        old_start,
        old_len,
        new_start,
        new_len,
    })
}

/// Parse "start" or "start,len".
fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Path from a `---`/`+++` header, `-p1` stripped; `None` for /dev/null.
///
/// Trailing tab-separated timestamps are dropped.
pub(super) fn parse_header_path(raw: &str) -> Option<Option<String>> {
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == "/dev/null" {
        return Some(None);
    }
    strip_one_component(raw).map(|p| Some(normalize_path(p)))
}

/// Drop the first path component (`patch -p1`).
fn strip_one_component(path: &str) -> Option<&str> {
    let (_, rest) = path.split_once('/')?;
    (!rest.is_empty()).then_some(rest)
}

/// Whether a repository-relative path stays inside the repository.
pub(super) fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path.split('/').all(|c| !c.is_empty() && c != "." && c != "..")
}

/// Normalize a file path to use forward slashes.
pub(super) fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}
