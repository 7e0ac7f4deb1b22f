//! Applying parsed file patches to a directory tree.

use super::parser::{FilePatch, Hunk, parse_diff};
use crate::error::{PatchbayError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// In-memory file contents split into lines.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TextFile {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl TextFile {
    fn parse(content: &str) -> Self {
        if content.is_empty() {
            return Self {
                lines: Vec::new(),
                trailing_newline: false,
            };
        }
        let trailing_newline = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(content);
        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Apply a unified diff below `root`.
///
/// Every file patch is computed in memory first; files are only written once
/// all of them applied. Returns the repository-relative paths written or
/// removed. Text without any file patch applies as a no-op.
pub fn apply_diff(root: &Path, diff_text: &str) -> Result<Vec<String>> {
    let patches = parse_diff(diff_text)?;

    // None marks a deletion.
    let mut staged: BTreeMap<String, Option<TextFile>> = BTreeMap::new();
    for patch in &patches {
        stage_patch(root, patch, &mut staged)?;
    }

    for (rel, content) in &staged {
        let path = root.join(rel);
        match content {
            Some(file) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| write_error(&path, e))?;
                }
                fs::write(&path, file.render()).map_err(|e| write_error(&path, e))?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(&path, e)),
            },
        }
    }

    Ok(staged.into_keys().collect())
}

fn stage_patch(
    root: &Path,
    patch: &FilePatch,
    staged: &mut BTreeMap<String, Option<TextFile>>,
) -> Result<()> {
    let current = match &patch.old_path {
        None => {
            if exists(root, staged, patch.target()) {
                return Err(PatchbayError::PatchError(format!(
                    "cannot create '{}': file already exists",
                    patch.target()
                )));
            }
            TextFile::parse("")
        }
        Some(old) => read_current(root, staged, old)?,
    };

    let mut file = current;
    let mut min_index = 0;
    let mut offset: isize = 0;
    for (i, hunk) in patch.hunks.iter().enumerate() {
        let (end, shift) = apply_hunk(&mut file, hunk, min_index, offset).ok_or_else(|| {
            PatchbayError::PatchError(format!(
                "hunk #{} (@@ -{},{} +{},{} @@) does not apply to '{}'",
                i + 1,
                hunk.old_start,
                hunk.old_len,
                hunk.new_start,
                hunk.new_len,
                patch.target()
            ))
        })?;
        min_index = end;
        offset = shift;
    }

    match (&patch.old_path, &patch.new_path) {
        (Some(old), None) => {
            if !file.lines.is_empty() {
                return Err(PatchbayError::PatchError(format!(
                    "cannot delete '{}': content does not match the diff",
                    old
                )));
            }
            staged.insert(old.clone(), None);
        }
        (Some(old), Some(new)) if old != new => {
            if exists(root, staged, new) {
                return Err(PatchbayError::PatchError(format!(
                    "cannot rename '{}' to '{}': target already exists",
                    old, new
                )));
            }
            staged.insert(old.clone(), None);
            staged.insert(new.clone(), Some(file));
        }
        (_, Some(new)) => {
            staged.insert(new.clone(), Some(file));
        }
        (None, None) => {}
    }
    Ok(())
}

/// Apply one hunk, searching outward from the expected position.
///
/// Returns the index just past the hunk's new lines and the offset later
/// hunks' header positions need: drift plus the lines this hunk added.
fn apply_hunk(
    file: &mut TextFile,
    hunk: &Hunk,
    min_index: usize,
    offset: isize,
) -> Option<(usize, isize)> {
    let old = hunk.old_lines();
    let new: Vec<String> = hunk.new_lines().into_iter().map(str::to_string).collect();

    // A zero-length old side inserts after line `old_start`.
    let nominal = if hunk.old_len == 0 {
        hunk.old_start
    } else {
        hunk.old_start.saturating_sub(1)
    };
    let expected = nominal.saturating_add_signed(offset);

    let at = find_match(&file.lines, &old, expected, min_index)?;
    let reaches_eof = at + old.len() == file.lines.len();

    let _replaced: Vec<String> = file.lines.splice(at..at + old.len(), new.iter().cloned()).collect();
    if reaches_eof && !file.lines.is_empty() {
        if hunk.new_missing_newline {
            file.trailing_newline = false;
        } else if hunk.old_missing_newline || !file.trailing_newline {
            file.trailing_newline = true;
        }
    }

    let shift = at as isize - nominal as isize + new.len() as isize - old.len() as isize;
    Some((at + new.len(), shift))
}

fn find_match(lines: &[String], old: &[&str], expected: usize, min_index: usize) -> Option<usize> {
    if lines.len() < old.len() {
        return None;
    }
    let max_index = lines.len() - old.len();
    if min_index > max_index {
        return None;
    }
    let expected = expected.clamp(min_index, max_index);
    if old.is_empty() {
        return Some(expected);
    }

    let matches_at = |i: usize| lines[i..i + old.len()].iter().zip(old).all(|(a, b)| a == b);

    let span = (expected - min_index).max(max_index - expected);
    for delta in 0..=span {
        if let Some(i) = expected.checked_sub(delta)
            && i >= min_index
            && matches_at(i)
        {
            return Some(i);
        }
        let i = expected + delta;
        if delta > 0 && i <= max_index && matches_at(i) {
            return Some(i);
        }
    }
    None
}

fn exists(root: &Path, staged: &BTreeMap<String, Option<TextFile>>, rel: &str) -> bool {
    match staged.get(rel) {
        Some(content) => content.is_some(),
        None => root.join(rel).exists(),
    }
}

fn read_current(
    root: &Path,
    staged: &BTreeMap<String, Option<TextFile>>,
    rel: &str,
) -> Result<TextFile> {
    if let Some(content) = staged.get(rel) {
        return content.clone().ok_or_else(|| {
            PatchbayError::PatchError(format!("'{}' was deleted earlier in the same diff", rel))
        });
    }

    let path = root.join(rel);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(TextFile::parse(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PatchbayError::PatchError(
            format!("cannot patch '{}': file does not exist", rel),
        )),
        Err(e) => Err(PatchbayError::PatchError(format!(
            "cannot read '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn write_error(path: &Path, e: std::io::Error) -> PatchbayError {
    PatchbayError::PatchError(format!("failed to write '{}': {}", path.display(), e))
}
