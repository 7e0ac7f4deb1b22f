//! Run configuration for patchbay.
//!
//! This module defines the Config struct that represents `patchbay.yaml` at
//! the workspace root. Unknown fields are ignored for forward compatibility,
//! optional fields fall back to defaults, and values are validated on load.

mod model;
mod operations;
pub mod types;


pub use model::Config;
pub use types::{GateStep, GeneratorConfig, TestGateConfig, TestsStageGate};
