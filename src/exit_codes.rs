//! Exit code constants for the patchbay CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unreadable or invalid input files)
//! - 2: Task graph error (missing dependency, duplicate id, cycle)
//! - 3: Patch failure
//! - 4: Lock acquisition failure or timeout
//! - 5: Generator or test gate could not be executed
//! - 6: Run finished with failed, blocked or unscheduled tasks

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid input files.
pub const USER_ERROR: i32 = 1;

/// Task graph is invalid: a dependency is missing or the graph has a cycle.
pub const GRAPH_FAILURE: i32 = 2;

/// A unified diff did not apply cleanly.
pub const PATCH_FAILURE: i32 = 3;

/// The merge lock could not be acquired.
pub const LOCK_FAILURE: i32 = 4;

/// An external command (generator or test gate) could not be run.
pub const EXECUTION_FAILURE: i32 = 5;

/// The run completed but left tasks failed, blocked, deferred or unscheduled.
pub const TASKS_UNRESOLVED: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            GRAPH_FAILURE,
            PATCH_FAILURE,
            LOCK_FAILURE,
            EXECUTION_FAILURE,
            TASKS_UNRESOLVED,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
