// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! conman-core: shared data model for the machine supervisor.
//!
//! Everything here is pure data and pure logic — no I/O, no async, no
//! locking beyond what a single struct needs to stay internally
//! consistent. Persistence, collaborator traits, and orchestration live
//! in the `conman-store`, `conman-collab`, `conman-engine` and
//! `conman-daemon` crates.

pub mod clock;
pub mod error;
pub mod id;
pub mod image;
pub mod macros;
pub mod name;
pub mod record;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{Error, ErrorKind, ResultExt, StoreError};
pub use id::MachineId;
pub use image::{resolve as resolve_image, ImageSpec, UnsupportedImage};
pub use name::{validate_name, NameError, RESERVED_NAMES};
pub use record::{Builtin, MachineConfig, MachineRecord};
pub use state::{can_transition, MachineState};
