//! Filesystem utilities for patchbay.
//!
//! Atomic writes keep the plan document and artifacts intact across crashes;
//! tree helpers copy workspaces into sandboxes while skipping ignored
//! directories.

pub mod atomic;
pub mod tree;

pub use atomic::{atomic_write, atomic_write_file};
pub use tree::{copy_tree, is_ignored, relative_path, remove_tree};
