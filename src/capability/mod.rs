//! Capability catalogue and routing.
//!
//! A capability is a named execution profile (tags used for routing, a
//! container image hint, a concurrency ceiling and a budget). The catalogue is
//! loaded once per run from `capabilities.yaml` and never changes afterwards:
//!
//! ```yaml
//! capabilities:
//!   docs_writer:
//!     tags: [docs, readme]
//!     docker_image: python:3.12
//!     concurrency: 2
//!     budget: { max_tasks_inflight: 3, max_fix_attempts: 2 }
//! ```
//!
//! Declaration order matters: it breaks routing ties.

mod catalogue;
mod router;

pub use catalogue::Catalogue;
pub use router::{Route, assign_capabilities, routing_text, score};

use serde::{Deserialize, Serialize};

/// Per-capability resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Attempts of this capability that may be outstanding at once.
    pub max_tasks_inflight: usize,

    /// Retries granted across the whole run.
    pub max_fix_attempts: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_tasks_inflight: DEFAULT_MAX_TASKS_INFLIGHT,
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
        }
    }
}

pub const DEFAULT_MAX_TASKS_INFLIGHT: usize = 5;
pub const DEFAULT_MAX_FIX_ATTEMPTS: usize = 6;
pub const DEFAULT_CONCURRENCY: usize = 1;

/// An execution profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    /// Lowercased routing tags.
    pub tags: Vec<String>,
    pub docker_image: String,
    /// Maximum concurrent executions.
    pub concurrency: usize,
    pub budget: Budget,
}

impl Capability {
    /// A capability with no tags and default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            docker_image: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            budget: Budget::default(),
        }
    }
}
