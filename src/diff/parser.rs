//! Core diff parsing logic.

use crate::error::{PatchbayError, Result};

use super::helpers::{
    HunkRange, is_safe_relative, parse_diff_git_line, parse_header_path, parse_hunk_header,
};

/// One line of a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// A contiguous change within one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line in the old file (0 for an empty old side).
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
    /// The old side's last line has no trailing newline.
    pub old_missing_newline: bool,
    /// The new side's last line has no trailing newline.
    pub new_missing_newline: bool,
}

impl Hunk {
    fn new(range: HunkRange) -> Self {
        Self {
            old_start: range.old_start,
            old_len: range.old_len,
            new_start: range.new_start,
            new_len: range.new_len,
            lines: Vec::new(),
            old_missing_newline: false,
            new_missing_newline: false,
        }
    }

    /// Lines the hunk expects to find (context and removals).
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines the hunk leaves behind (context and additions).
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    fn counts(&self) -> (usize, usize) {
        let old = self
            .lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Add(_)))
            .count();
        let new = self
            .lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Remove(_)))
            .count();
        (old, new)
    }

    fn is_complete(&self) -> bool {
        self.counts() == (self.old_len, self.new_len)
    }
}

/// All changes to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePatch {
    /// Path before the change; `None` when the file is created.
    pub old_path: Option<String>,
    /// Path after the change; `None` when the file is deleted.
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn is_create(&self) -> bool {
        self.old_path.is_none()
    }

    pub fn is_delete(&self) -> bool {
        self.new_path.is_none()
    }

    /// The path this patch leaves behind, or removes for a deletion.
    pub fn target(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }
}

/// Whether text contains at least one file header pair or git diff header.
///
/// Used to tell a diff apart from prose or an empty reply.
pub fn looks_like_diff(text: &str) -> bool {
    let mut prev_old_header = false;
    for line in text.lines() {
        if line.starts_with("diff --git ") {
            return true;
        }
        if prev_old_header && line.starts_with("+++ ") {
            return true;
        }
        prev_old_header = line.starts_with("--- ");
    }
    false
}

/// Per-file state while scanning git extended headers.
#[derive(Default)]
struct Pending {
    patch: FilePatch,
    git_new_file: bool,
    git_deleted_file: bool,
    has_headers: bool,
}

/// Parse a unified diff into file patches.
///
/// Text outside file sections (commit messages, prose around a diff) is
/// ignored. Malformed hunk headers, hunks cut short, unsafe paths and binary
/// patches are `PatchError`s.
pub fn parse_diff(text: &str) -> Result<Vec<FilePatch>> {
    let mut patches = Vec::new();
    let mut current: Option<Pending> = None;
    let mut hunk: Option<Hunk> = None;
    // Remembers which side the previous body line belonged to, for "\ No newline".
    let mut last_line: Option<HunkLine> = None;

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        // Inside a hunk, body lines are counted, so "--- x" may be a removal.
        if let Some(h) = hunk.as_mut()
            && !h.is_complete()
        {
            let body = match line.chars().next() {
                Some(' ') => HunkLine::Context(line[1..].to_string()),
                Some('-') => HunkLine::Remove(line[1..].to_string()),
                Some('+') => HunkLine::Add(line[1..].to_string()),
                // Some tools strip the single space of an empty context line.
                None => HunkLine::Context(String::new()),
                Some('\\') => {
                    mark_missing_newline(h, last_line.as_ref());
                    continue;
                }
                Some(_) => {
                    return Err(PatchbayError::PatchError(format!(
                        "malformed hunk line in '{}': {:?}",
                        current.as_ref().map(|c| c.patch.target()).unwrap_or("?"),
                        line
                    )));
                }
            };
            h.lines.push(body.clone());
            last_line = Some(body);
            continue;
        }

        if line.starts_with('\\') {
            if let Some(h) = hunk.as_mut() {
                mark_missing_newline(h, last_line.as_ref());
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish_file(&mut patches, &mut current, &mut hunk)?;
            let mut pending = Pending::default();
            if let Some((old, new)) = parse_diff_git_line(rest) {
                pending.patch.old_path = Some(old);
                pending.patch.new_path = Some(new);
            }
            current = Some(pending);
            continue;
        }

        if line.starts_with("--- ") && lines.peek().is_some_and(|n| n.starts_with("+++ ")) {
            let old_raw = &line[4..];
            let new_raw = lines.next().map(|n| &n[4..]).unwrap_or_default();
            let old = parse_header_path(old_raw).ok_or_else(|| bad_path(old_raw))?;
            let new = parse_header_path(new_raw).ok_or_else(|| bad_path(new_raw))?;

            // A header pair without "diff --git" starts a new file section,
            // and so does a second pair inside one git section.
            let reuse = current.as_ref().is_some_and(|c| !c.has_headers && c.patch.hunks.is_empty())
                && hunk.is_none();
            if !reuse {
                finish_file(&mut patches, &mut current, &mut hunk)?;
                current = Some(Pending::default());
            }
            if let Some(pending) = current.as_mut() {
                pending.patch.old_path = old;
                pending.patch.new_path = new;
                pending.has_headers = true;
            }
            continue;
        }

        if line.starts_with("@@ ") {
            let range = parse_hunk_header(line).ok_or_else(|| {
                PatchbayError::PatchError(format!("malformed hunk header: {:?}", line))
            })?;
            let Some(pending) = current.as_mut() else {
                return Err(PatchbayError::PatchError(format!(
                    "hunk without file header: {:?}",
                    line
                )));
            };
            if let Some(done) = hunk.take() {
                pending.patch.hunks.push(done);
            }
            hunk = Some(Hunk::new(range));
            last_line = None;
            continue;
        }

        // Git extended headers of the current file section.
        if let Some(pending) = current.as_mut()
            && !pending.has_headers
        {
            if line.starts_with("new file mode") {
                pending.git_new_file = true;
            } else if line.starts_with("deleted file mode") {
                pending.git_deleted_file = true;
            } else if line.starts_with("GIT binary patch") || line.starts_with("Binary files ") {
                return Err(PatchbayError::PatchError(format!(
                    "binary patches are not supported ('{}')",
                    pending.patch.target()
                )));
            }
        }
    }

    finish_file(&mut patches, &mut current, &mut hunk)?;
    Ok(patches)
}

fn mark_missing_newline(hunk: &mut Hunk, last: Option<&HunkLine>) {
    match last {
        Some(HunkLine::Remove(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        None => {}
    }
}

fn finish_file(
    patches: &mut Vec<FilePatch>,
    current: &mut Option<Pending>,
    hunk: &mut Option<Hunk>,
) -> Result<()> {
    let Some(mut pending) = current.take() else {
        return Ok(());
    };
    if let Some(done) = hunk.take() {
        pending.patch.hunks.push(done);
    }

    for h in &pending.patch.hunks {
        if !h.is_complete() {
            return Err(PatchbayError::PatchError(format!(
                "truncated hunk @@ -{},{} +{},{} @@ in '{}'",
                h.old_start,
                h.old_len,
                h.new_start,
                h.new_len,
                pending.patch.target()
            )));
        }
    }

    let mut patch = pending.patch;
    if !pending.has_headers {
        // Only git headers: e.g. an empty new file or a pure mode change.
        if pending.git_new_file {
            patch.old_path = None;
        }
        if pending.git_deleted_file {
            patch.new_path = None;
        }
    }

    if patch.old_path.is_none() && patch.new_path.is_none() {
        return Err(PatchbayError::PatchError(
            "file patch with /dev/null on both sides".to_string(),
        ));
    }
    for path in [&patch.old_path, &patch.new_path].into_iter().flatten() {
        if !is_safe_relative(path) {
            return Err(PatchbayError::PatchError(format!(
                "path escapes the repository: '{}'",
                path
            )));
        }
    }

    patches.push(patch);
    Ok(())
}

fn bad_path(raw: &str) -> PatchbayError {
    PatchbayError::PatchError(format!(
        "cannot strip leading component from path {:?}",
        raw
    ))
}
