//! Policy (`CMP####`) state: a version-indexed default table plus a
//! push/pop stack for `cmake_policy(PUSH/POP)`, per design note "Policy
//! defaults" (§9) and Open Question C.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// `project()` without `VERSION` clears the version variables (NEW)
    /// vs. leaves them stale (OLD).
    Cmp0048,
    /// A local `set()` shadows an existing cache entry of the same name
    /// (NEW) vs. a `set(CACHE)` clears the existing normal variable (OLD).
    Cmp0126,
    /// `return(PROPAGATE var...)` copies the named variables into the
    /// caller's scope on unwind (NEW) vs. `return()` takes no arguments
    /// and PROPAGATE is unrecognized (OLD).
    Cmp0140,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySetting {
    Old,
    New,
    Unset,
}

/// The version at which each policy's default flips from OLD to NEW,
/// mirroring `cmake --help-policy` tables. Looked up once per
/// `cmake_minimum_required`/`cmake_policy(VERSION ...)` call.
fn default_new_since(policy: Policy) -> (u64, u64) {
    match policy {
        Policy::Cmp0048 => (3, 0),
        Policy::Cmp0126 => (3, 21),
        Policy::Cmp0140 => (3, 25),
    }
}

/// One snapshot of policy state, cloned onto [`PolicyStack`]'s stack by
/// `cmake_policy(PUSH)` and restored by `POP`.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    overrides: HashMap<Policy, PolicySetting>,
    baseline: (u64, u64),
}

impl PolicyTable {
    pub fn new() -> Self {
        PolicyTable { overrides: HashMap::new(), baseline: (0, 0) }
    }

    /// Applies a new minimum-required/policy-version baseline. Does not
    /// clear explicit `SET`/`PUSH` overrides already in effect.
    pub fn set_baseline(&mut self, major: u64, minor: u64) {
        self.baseline = (major, minor);
    }

    pub fn set(&mut self, policy: Policy, setting: PolicySetting) {
        self.overrides.insert(policy, setting);
    }

    pub fn get(&self, policy: Policy) -> PolicySetting {
        if let Some(setting) = self.overrides.get(&policy) {
            return *setting;
        }
        let (maj, min) = default_new_since(policy);
        if self.baseline >= (maj, min) {
            PolicySetting::New
        } else {
            PolicySetting::Old
        }
    }

    pub fn is_new(&self, policy: Policy) -> bool {
        self.get(policy) == PolicySetting::New
    }
}

/// Name lookup for `cmake_policy(SET CMP#### ...)`/`if(POLICY CMP####)`.
pub fn policy_by_name(name: &str) -> Option<Policy> {
    match name {
        "CMP0048" => Some(Policy::Cmp0048),
        "CMP0126" => Some(Policy::Cmp0126),
        "CMP0140" => Some(Policy::Cmp0140),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_below_threshold_defaults_old() {
        let mut table = PolicyTable::new();
        table.set_baseline(3, 10);
        assert_eq!(table.get(Policy::Cmp0126), PolicySetting::Old);
    }

    #[test]
    fn baseline_at_threshold_defaults_new() {
        let mut table = PolicyTable::new();
        table.set_baseline(3, 21);
        assert_eq!(table.get(Policy::Cmp0126), PolicySetting::New);
    }

    #[test]
    fn explicit_set_overrides_baseline_default() {
        let mut table = PolicyTable::new();
        table.set_baseline(3, 21);
        table.set(Policy::Cmp0126, PolicySetting::Old);
        assert_eq!(table.get(Policy::Cmp0126), PolicySetting::Old);
    }

    #[test]
    fn policy_by_name_recognizes_known_ids() {
        assert_eq!(policy_by_name("CMP0048"), Some(Policy::Cmp0048));
        assert_eq!(policy_by_name("CMP9999"), None);
    }
}
