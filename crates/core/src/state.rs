// SPDX-License-Identifier: MIT

//! Machine state enum and the transition matrix (spec §3, §4.2).

use serde::{Deserialize, Serialize};

/// The finite set of states a machine traverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Creating,
    Stopped,
    Starting,
    Running,
    Stopping,
    Deleting,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Creating => "creating",
            MachineState::Stopped => "stopped",
            MachineState::Starting => "starting",
            MachineState::Running => "running",
            MachineState::Stopping => "stopping",
            MachineState::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `(old, new)` is a legal transition, and if so whether it may
/// only be driven internally.
///
/// Mirrors the matrix in spec §4.2 exactly:
///
/// ```text
/// Creating → Stopped        (internal, after successful initial setup)
/// Creating → Deleting       (internal, failed-create cleanup)
/// Stopped  → Starting       (either)
/// Starting → Running        (internal, once init+agent+bpf ready)
/// Starting → Stopped        (internal, rollback on start failure)
/// Running  → Stopping       (either)
/// Stopping → Stopped        (internal)
/// Stopped  → Deleting       (either)
/// Deleting → (removed)      (internal)
/// ```
fn transition_rule(old: MachineState, new: MachineState) -> Option<Internality> {
    use MachineState::*;
    match (old, new) {
        (Creating, Stopped) => Some(Internality::InternalOnly),
        (Creating, Deleting) => Some(Internality::InternalOnly),
        (Stopped, Starting) => Some(Internality::Either),
        (Starting, Running) => Some(Internality::InternalOnly),
        (Starting, Stopped) => Some(Internality::InternalOnly),
        (Running, Stopping) => Some(Internality::Either),
        (Stopping, Stopped) => Some(Internality::InternalOnly),
        (Stopped, Deleting) => Some(Internality::Either),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Internality {
    Either,
    InternalOnly,
}

/// Returns whether `old -> new` is allowed, given whether the caller is
/// internal to the supervisor (`is_internal`) or an external RPC caller.
pub fn can_transition(old: MachineState, new: MachineState, is_internal: bool) -> bool {
    match transition_rule(old, new) {
        Some(Internality::Either) => true,
        Some(Internality::InternalOnly) => is_internal,
        None => false,
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
