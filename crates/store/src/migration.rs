// SPDX-License-Identifier: MIT

//! Schema migration. There is exactly one schema version today; this
//! module exists so a future format change has somewhere to live
//! without touching [`crate::Store`]'s public API.

use crate::Store;
use conman_core::StoreError;
use tracing::{info, warn};

/// The schema version this build of the store understands.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Stamp a freshly created store with [`CURRENT_SCHEMA_VERSION`], or
/// verify an existing store's stamp matches. A mismatch where the
/// on-disk version is *older* than what we understand would run
/// migration steps here; none exist yet, so any older version is
/// rejected rather than silently reinterpreted.
pub(crate) fn run(store: &Store) -> Result<(), StoreError> {
    match store.get_version()? {
        None => {
            info!(version = CURRENT_SCHEMA_VERSION, "initializing empty store");
            store.set_version(CURRENT_SCHEMA_VERSION)
        }
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
        Some(v) if v < CURRENT_SCHEMA_VERSION => {
            warn!(on_disk = v, current = CURRENT_SCHEMA_VERSION, "no migration path implemented");
            Err(StoreError::Backend(format!(
                "store schema version {v} predates {CURRENT_SCHEMA_VERSION} and no migration exists"
            )))
        }
        Some(v) => Err(StoreError::Backend(format!(
            "store schema version {v} is newer than this build understands ({CURRENT_SCHEMA_VERSION})"
        ))),
    }
}
