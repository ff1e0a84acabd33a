// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conman-store: the persistence facade (spec §4.1, C1).
//!
//! A typed get/set/delete layer over three named `sled` trees
//! (`containers`, `state`, `meta`), matching spec's "opaque binary
//! encoding for typed values and a raw byte encoding for simple
//! strings." All mutations are single-key `sled` operations (atomic by
//! construction) except [`Store::rename_container`], which updates two
//! keys in one tree and uses `sled`'s transactional API.

mod dns;
mod migration;

pub use dns::DnsQuery;
pub use migration::CURRENT_SCHEMA_VERSION;

use conman_core::{MachineId, MachineRecord, StoreError};
use std::path::Path;
use tracing::{debug, info};

const TREE_CONTAINERS: &[u8] = b"containers";
const TREE_STATE: &[u8] = b"state";
const TREE_META: &[u8] = b"meta";

const KEY_LAST_CONTAINER_ID: &[u8] = b"last_container_id";
const KEY_DEFAULT_CONTAINER_ID: &[u8] = b"default_container_id";
const KEY_DNS_RECENT_QUERIES: &[u8] = b"dns_recent_queries";
const KEY_SCHEMA_VERSION: &[u8] = b"schema_version";

/// The persistence facade. Cheap to clone — `sled::Db` is an `Arc`
/// internally, so cloning shares the same open database handle.
#[derive(Clone)]
pub struct Store {
    containers: sled::Tree,
    state: sled::Tree,
    meta: sled::Tree,
}

impl Store {
    /// Open (creating if absent) the key-value file at `path`, creating
    /// the `containers`/`state`/`meta` trees if they don't exist, and
    /// running schema migration (a no-op when the on-disk version
    /// already matches [`CURRENT_SCHEMA_VERSION`]).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref()).map_err(|e| StoreError::Backend(e.to_string()))?;
        let containers = db.open_tree(TREE_CONTAINERS).map_err(|e| StoreError::Backend(e.to_string()))?;
        let state = db.open_tree(TREE_STATE).map_err(|e| StoreError::Backend(e.to_string()))?;
        let meta = db.open_tree(TREE_META).map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { containers, state, meta };
        migration::run(&store)?;
        Ok(store)
    }

    // --- containers bucket -------------------------------------------------

    pub fn get_container(&self, id: MachineId) -> Result<Option<MachineRecord>, StoreError> {
        get_typed(&self.containers, id.as_str().as_bytes())
    }

    pub fn set_container(&self, id: MachineId, record: &MachineRecord) -> Result<(), StoreError> {
        set_typed(&self.containers, id.as_str().as_bytes(), record)?;
        debug!(id = %id, "persisted container record");
        Ok(())
    }

    pub fn delete_container(&self, id: MachineId) -> Result<(), StoreError> {
        self.containers
            .remove(id.as_str().as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn list_containers(&self) -> Result<Vec<MachineRecord>, StoreError> {
        let mut out = Vec::new();
        for entry in self.containers.iter() {
            let (_, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    // --- state bucket --------------------------------------------------------

    pub fn get_last_container_id(&self) -> Result<Option<MachineId>, StoreError> {
        get_id(&self.state, KEY_LAST_CONTAINER_ID)
    }

    pub fn set_last_container_id(&self, id: MachineId) -> Result<(), StoreError> {
        set_id(&self.state, KEY_LAST_CONTAINER_ID, id)
    }

    pub fn get_default_container_id(&self) -> Result<Option<MachineId>, StoreError> {
        get_id(&self.state, KEY_DEFAULT_CONTAINER_ID)
    }

    pub fn set_default_container_id(&self, id: MachineId) -> Result<(), StoreError> {
        set_id(&self.state, KEY_DEFAULT_CONTAINER_ID, id)
    }

    pub fn get_dns_recent_queries(&self) -> Result<Vec<DnsQuery>, StoreError> {
        Ok(get_typed(&self.state, KEY_DNS_RECENT_QUERIES)?.unwrap_or_default())
    }

    pub fn set_dns_recent_queries(&self, queries: &[DnsQuery]) -> Result<(), StoreError> {
        set_typed(&self.state, KEY_DNS_RECENT_QUERIES, &queries.to_vec())
    }

    // --- meta bucket -----------------------------------------------------

    pub fn get_version(&self) -> Result<Option<u32>, StoreError> {
        match self.meta.get(KEY_SCHEMA_VERSION).map_err(|e| StoreError::Backend(e.to_string()))? {
            Some(bytes) => {
                let arr: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                    StoreError::Encoding("schema_version is not 4 bytes".to_string())
                })?;
                Ok(Some(u32::from_le_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn set_version(&self, version: u32) -> Result<(), StoreError> {
        self.meta
            .insert(KEY_SCHEMA_VERSION, &version.to_le_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Rename a container record in place: re-reads the record under `id`,
    /// rewrites its `name` field, and writes it back in a single
    /// transaction against the `containers` tree. The caller (container
    /// manager) is responsible for the in-memory id<->name map swap and
    /// for the fixed `containersMu > c.mu` lock order around this call.
    pub fn rename_container(&self, id: MachineId, new_name: &str) -> Result<(), StoreError> {
        let key = id.as_str();
        self.containers
            .transaction(|tx| {
                let existing = tx.get(key.as_bytes())?;
                let Some(existing) = existing else {
                    return Ok(Err(StoreError::NotFound));
                };
                let mut record: MachineRecord = match decode(&existing) {
                    Ok(r) => r,
                    Err(e) => return Ok(Err(e)),
                };
                record.name = new_name.to_string();
                let encoded = match encode(&record) {
                    Ok(b) => b,
                    Err(e) => return Ok(Err(e)),
                };
                tx.insert(key.as_bytes(), encoded)?;
                Ok(Ok(()))
            })
            .map_err(|e: sled::transaction::TransactionError<StoreError>| match e {
                sled::transaction::TransactionError::Abort(e) => e,
                sled::transaction::TransactionError::Storage(e) => StoreError::Backend(e.to_string()),
            })?
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.containers.flush().map_err(|e| StoreError::Backend(e.to_string()))?;
        self.state.flush().map_err(|e| StoreError::Backend(e.to_string()))?;
        self.meta.flush().map_err(|e| StoreError::Backend(e.to_string()))?;
        info!("store flushed");
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn get_typed<T: serde::de::DeserializeOwned>(
    tree: &sled::Tree,
    key: &[u8],
) -> Result<Option<T>, StoreError> {
    match tree.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn set_typed<T: serde::Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<(), StoreError> {
    let encoded = encode(value)?;
    tree.insert(key, encoded).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

fn get_id(tree: &sled::Tree, key: &[u8]) -> Result<Option<MachineId>, StoreError> {
    match tree.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
        Some(bytes) => {
            let s = std::str::from_utf8(bytes.as_ref())
                .map_err(|e| StoreError::Encoding(e.to_string()))?;
            MachineId::parse(s).map(Some).map_err(|e| StoreError::Encoding(e.to_string()))
        }
        None => Ok(None),
    }
}

fn set_id(tree: &sled::Tree, key: &[u8], id: MachineId) -> Result<(), StoreError> {
    tree.insert(key, id.as_str().as_bytes()).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
