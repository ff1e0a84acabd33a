// SPDX-License-Identifier: MIT

use super::*;
use MachineState::*;

#[yare::parameterized(
    creating_to_stopped_internal = { Creating, Stopped, true, true },
    creating_to_stopped_external = { Creating, Stopped, false, false },
    creating_to_deleting_internal = { Creating, Deleting, true, true },
    creating_to_deleting_external = { Creating, Deleting, false, false },
    stopped_to_starting_internal = { Stopped, Starting, true, true },
    stopped_to_starting_external = { Stopped, Starting, false, true },
    starting_to_running_internal = { Starting, Running, true, true },
    starting_to_running_external = { Starting, Running, false, false },
    starting_to_stopped_internal = { Starting, Stopped, true, true },
    starting_to_stopped_external = { Starting, Stopped, false, false },
    running_to_stopping_internal = { Running, Stopping, true, true },
    running_to_stopping_external = { Running, Stopping, false, true },
    stopping_to_stopped_internal = { Stopping, Stopped, true, true },
    stopping_to_stopped_external = { Stopping, Stopped, false, false },
    stopped_to_deleting_internal = { Stopped, Deleting, true, true },
    stopped_to_deleting_external = { Stopped, Deleting, false, true },
)]
fn transition_matrix(old: MachineState, new: MachineState, is_internal: bool, allowed: bool) {
    assert_eq!(can_transition(old, new, is_internal), allowed);
}

#[test]
fn no_other_transitions_are_allowed() {
    let all = [Creating, Stopped, Starting, Running, Stopping, Deleting];
    for &old in &all {
        for &new in &all {
            if transition_rule(old, new).is_none() {
                assert!(!can_transition(old, new, true), "{old:?} -> {new:?} internal");
                assert!(!can_transition(old, new, false), "{old:?} -> {new:?} external");
            }
        }
    }
}

#[test]
fn deleting_has_no_outgoing_transitions() {
    for &new in &[Creating, Stopped, Starting, Running, Stopping, Deleting] {
        assert!(!can_transition(Deleting, new, true));
        assert!(!can_transition(Deleting, new, false));
    }
}
