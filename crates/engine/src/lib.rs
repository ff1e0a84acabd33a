// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! conman-engine: per-machine orchestration built on the collaborator
//! traits in `conman-collab` — mutation holds and cancellable jobs
//! (C3), the Docker freezer (C4), published runtime state (C5), the
//! forward engine (C8), and the reconciliation watchdog (C9).
//!
//! Nothing in this crate talks to `sled` or the wire format directly;
//! it is handed already-decoded records and already-constructed
//! collaborators by `conman-daemon`, and hands back state transitions
//! for the daemon to persist.

pub mod forward;
pub mod freezer;
pub mod holds;
pub mod hooks;
pub mod runtime_state;
pub mod watchdog;

pub use forward::{passes_filter, ForwardEngine, ForwardTable, Subnet};
pub use freezer::{Freezer, FreezerTarget};
pub use holds::{EndMutationToken, JobManager, MutationHolds};
pub use hooks::{hooks_for, ConfigHook, DefaultHooks, DockerHooks, Hooks, MakeFreezerHook, PostStartHook, PostStopHook, PreStartHook};
pub use runtime_state::{RuntimeState, RuntimeStateSlot};
pub use watchdog::{TickReport, Watchdog};
