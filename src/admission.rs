//! Admission control: per-capability budgets and concurrency ceilings.
//!
//! Counters live in one object per run. The coordinator admits a task only
//! when both gates have room and releases the slot once the task reaches a
//! terminal outcome; there is no preemption.

use crate::capability::{Budget, Catalogue, DEFAULT_CONCURRENCY};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetState {
    pub inflight: usize,
    pub fixes_used: usize,
}

/// Inflight and fix-attempt limits per capability.
#[derive(Debug, Clone, Default)]
pub struct BudgetGate {
    limits: HashMap<String, Budget>,
    state: HashMap<String, BudgetState>,
}

impl BudgetGate {
    pub fn new(limits: HashMap<String, Budget>) -> Self {
        Self {
            limits,
            state: HashMap::new(),
        }
    }

    fn limit(&self, cap: &str) -> Budget {
        self.limits.get(cap).copied().unwrap_or_default()
    }

    fn state_mut(&mut self, cap: &str) -> &mut BudgetState {
        self.state.entry(cap.to_string()).or_default()
    }

    pub fn state(&self, cap: &str) -> BudgetState {
        self.state.get(cap).copied().unwrap_or_default()
    }

    pub fn can_start(&self, cap: &str) -> bool {
        self.state(cap).inflight < self.limit(cap).max_tasks_inflight
    }

    pub fn started(&mut self, cap: &str) {
        self.state_mut(cap).inflight += 1;
    }

    /// Floored at zero.
    pub fn finished(&mut self, cap: &str) {
        let st = self.state_mut(cap);
        st.inflight = st.inflight.saturating_sub(1);
    }

    pub fn can_fix(&self, cap: &str) -> bool {
        self.state(cap).fixes_used < self.limit(cap).max_fix_attempts
    }

    pub fn used_fix(&mut self, cap: &str) {
        self.state_mut(cap).fixes_used += 1;
    }
}

/// Maximum concurrent executions per capability.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    limits: HashMap<String, usize>,
    running: HashMap<String, usize>,
}

impl ConcurrencyGate {
    pub fn new(limits: HashMap<String, usize>) -> Self {
        Self {
            limits,
            running: HashMap::new(),
        }
    }

    pub fn running(&self, cap: &str) -> usize {
        self.running.get(cap).copied().unwrap_or(0)
    }

    pub fn can_run(&self, cap: &str) -> bool {
        let limit = self.limits.get(cap).copied().unwrap_or(DEFAULT_CONCURRENCY);
        self.running(cap) < limit
    }

    pub fn start(&mut self, cap: &str) {
        *self.running.entry(cap.to_string()).or_insert(0) += 1;
    }

    /// Floored at zero.
    pub fn finish(&mut self, cap: &str) {
        let n = self.running.entry(cap.to_string()).or_insert(0);
        *n = n.saturating_sub(1);
    }
}

#[derive(Debug, Default)]
struct Gates {
    budget: BudgetGate,
    concurrency: ConcurrencyGate,
}

/// Both gates behind one lock, so a check and its increment are atomic.
#[derive(Debug, Default)]
pub struct AdmissionController {
    gates: Mutex<Gates>,
}

impl AdmissionController {
    /// Limits taken from the catalogue; unknown capabilities get defaults.
    pub fn from_catalogue(catalogue: &Catalogue) -> Self {
        let budgets = catalogue
            .iter()
            .map(|c| (c.name.clone(), c.budget))
            .collect();
        let concurrency = catalogue
            .iter()
            .map(|c| (c.name.clone(), c.concurrency))
            .collect();
        Self {
            gates: Mutex::new(Gates {
                budget: BudgetGate::new(budgets),
                concurrency: ConcurrencyGate::new(concurrency),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Gates> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.gates.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Take a slot in both gates if both have room.
    pub fn try_admit(&self, cap: &str) -> bool {
        let mut gates = self.lock();
        if gates.budget.can_start(cap) && gates.concurrency.can_run(cap) {
            gates.budget.started(cap);
            gates.concurrency.start(cap);
            true
        } else {
            false
        }
    }

    /// Give back a slot taken by `try_admit`.
    pub fn release(&self, cap: &str) {
        let mut gates = self.lock();
        gates.budget.finished(cap);
        gates.concurrency.finish(cap);
    }

    /// Consume one fix attempt if the budget allows it.
    pub fn try_use_fix(&self, cap: &str) -> bool {
        let mut gates = self.lock();
        if gates.budget.can_fix(cap) {
            gates.budget.used_fix(cap);
            true
        } else {
            false
        }
    }

    pub fn budget_state(&self, cap: &str) -> BudgetState {
        self.lock().budget.state(cap)
    }

    pub fn running(&self, cap: &str) -> usize {
        self.lock().concurrency.running(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use std::sync::Arc;
    use std::thread;

    fn catalogue() -> Catalogue {
        let mut narrow = Capability::new("narrow");
        narrow.concurrency = 1;
        narrow.budget = Budget {
            max_tasks_inflight: 1,
            max_fix_attempts: 2,
        };
        let mut wide = Capability::new("wide");
        wide.concurrency = 3;
        wide.budget.max_tasks_inflight = 2;
        Catalogue::new(vec![narrow, wide]).unwrap()
    }

    #[test]
    fn test_budget_gate_ceiling() {
        let mut gate = BudgetGate::new(HashMap::from([(
            "c".to_string(),
            Budget {
                max_tasks_inflight: 2,
                max_fix_attempts: 0,
            },
        )]));
        assert!(gate.can_start("c"));
        gate.started("c");
        gate.started("c");
        assert!(!gate.can_start("c"));
        gate.finished("c");
        assert!(gate.can_start("c"));
        assert!(!gate.can_fix("c"));
    }

    #[test]
    fn test_budget_finished_floors_at_zero() {
        let mut gate = BudgetGate::default();
        gate.finished("c");
        gate.finished("c");
        assert_eq!(gate.state("c").inflight, 0);
        gate.started("c");
        assert_eq!(gate.state("c").inflight, 1);
    }

    #[test]
    fn test_unknown_capability_uses_default_limits() {
        let mut gate = BudgetGate::default();
        for _ in 0..5 {
            assert!(gate.can_start("x"));
            gate.started("x");
        }
        assert!(!gate.can_start("x"));

        for _ in 0..6 {
            assert!(gate.can_fix("x"));
            gate.used_fix("x");
        }
        assert!(!gate.can_fix("x"));

        let mut conc = ConcurrencyGate::default();
        assert!(conc.can_run("x"));
        conc.start("x");
        assert!(!conc.can_run("x"));
    }

    #[test]
    fn test_concurrency_finish_floors_at_zero() {
        let mut gate = ConcurrencyGate::default();
        gate.finish("x");
        assert_eq!(gate.running("x"), 0);
        assert!(gate.can_run("x"));
    }

    #[test]
    fn test_try_admit_checks_both_gates() {
        let ctl = AdmissionController::from_catalogue(&catalogue());

        // wide: concurrency 3 but inflight 2
        assert!(ctl.try_admit("wide"));
        assert!(ctl.try_admit("wide"));
        assert!(!ctl.try_admit("wide"));
        assert_eq!(ctl.running("wide"), 2);

        ctl.release("wide");
        assert!(ctl.try_admit("wide"));
    }

    #[test]
    fn test_rejected_admission_changes_nothing() {
        let ctl = AdmissionController::from_catalogue(&catalogue());
        assert!(ctl.try_admit("narrow"));
        assert!(!ctl.try_admit("narrow"));

        assert_eq!(ctl.budget_state("narrow").inflight, 1);
        assert_eq!(ctl.running("narrow"), 1);
    }

    #[test]
    fn test_fix_budget_is_per_run() {
        let ctl = AdmissionController::from_catalogue(&catalogue());
        assert!(ctl.try_use_fix("narrow"));
        assert!(ctl.try_use_fix("narrow"));
        assert!(!ctl.try_use_fix("narrow"));
        assert_eq!(ctl.budget_state("narrow").fixes_used, 2);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_ceiling() {
        let ctl = Arc::new(AdmissionController::from_catalogue(&catalogue()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctl = Arc::clone(&ctl);
                thread::spawn(move || ctl.try_admit("wide"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 2);
    }
}
