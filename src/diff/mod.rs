//! Unified diff parsing and application for patchbay.
//!
//! Generators hand back their work as unified diffs. This module parses them
//! into [`FilePatch`] values and applies them to a directory tree without an
//! external `patch` binary. Supported:
//! - modifications with any number of hunks
//! - new files (`--- /dev/null`) and deletions (`+++ /dev/null`)
//! - renames (different old and new paths)
//! - `-p1` path stripping (`a/`, `b/`)
//! - `\ No newline at end of file` markers
//! - hunks whose line numbers drifted (offset search)
//!
//! Application is all-or-nothing per diff: nothing is written unless every
//! file patch applies.

mod apply;
mod helpers;
mod parser;


pub use apply::apply_diff;
pub use parser::{FilePatch, Hunk, HunkLine, looks_like_diff, parse_diff};
