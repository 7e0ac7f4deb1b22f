//! Locking subsystem for patchbay.
//!
//! Merges into the canonical workspace are serialized by a named lock marker
//! file in `<run_root>/<run_id>/locks/` (default `merge.lock`).
//!
//! # Lock Files
//!
//! Lock files are created using **create_new** semantics (exclusive create)
//! so that only one holder exists at a time, across threads and processes.
//! [`FileLock`] retries creation with a fixed poll delay until a timeout.
//!
//! # Lock Metadata
//!
//! Each lock file contains JSON metadata:
//! - `owner`: The owner of the lock (e.g., `user@HOST`)
//! - `pid`: The process ID (optional)
//! - `created_at`: RFC3339 timestamp
//! - `action`: What the holder is doing (e.g., `merge T1`)
//!
//! # RAII Guards
//!
//! Locks are managed through RAII guard objects that release the lock when
//! dropped. If deletion fails during drop, a warning is logged but the
//! program does not crash.

mod file_lock;
mod metadata;
mod operations;
mod types;


pub use file_lock::{FileLock, Lock, LockGuard};
pub use metadata::LockMetadata;
pub use operations::{clear_lock, list_locks, try_acquire};
pub use types::LockInfo;
