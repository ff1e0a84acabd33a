// SPDX-License-Identifier: MIT

//! The BPF-backed port monitor and forward-blocker the forward engine
//! (C8) scans and mutates. Real implementations attach a BPF program to
//! a machine's netns; this crate only defines the seam and, under
//! `test-support`, an in-memory fake that lets tests script which
//! listeners "appear" on a given scan.

use crate::agent::{ForwardSpec, Protocol};
use conman_core::Error;

/// A listening socket observed inside a machine's netns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerSpec {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
}

impl From<&ListenerSpec> for ForwardSpec {
    fn from(l: &ListenerSpec) -> Self {
        ForwardSpec { protocol: l.protocol, guest_address: l.address.clone(), port: l.port }
    }
}

/// Scoped to one machine's netns. The forward engine polls
/// [`PortMonitor::scan_listeners`] on its debounce interval and diffs
/// the result against the forward table.
pub trait PortMonitor: Send + Sync + 'static {
    fn scan_listeners(&self) -> Result<Vec<ListenerSpec>, Error>;
    fn block_port(&self, spec: &ForwardSpec) -> Result<(), Error>;
    fn unblock_port(&self, spec: &ForwardSpec) -> Result<(), Error>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// An in-memory [`PortMonitor`]. Tests call
    /// [`FakePortMonitor::set_listeners`] to simulate the guest opening
    /// or closing a socket between scans.
    #[derive(Clone, Default)]
    pub struct FakePortMonitor {
        listeners: Arc<Mutex<Vec<ListenerSpec>>>,
        blocked: Arc<Mutex<HashSet<ForwardSpec>>>,
    }

    impl FakePortMonitor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_listeners(&self, listeners: Vec<ListenerSpec>) {
            *self.listeners.lock() = listeners;
        }

        pub fn blocked_ports(&self) -> Vec<ForwardSpec> {
            self.blocked.lock().iter().cloned().collect()
        }
    }

    impl PortMonitor for FakePortMonitor {
        fn scan_listeners(&self) -> Result<Vec<ListenerSpec>, Error> {
            Ok(self.listeners.lock().clone())
        }

        fn block_port(&self, spec: &ForwardSpec) -> Result<(), Error> {
            self.blocked.lock().insert(spec.clone());
            Ok(())
        }

        fn unblock_port(&self, spec: &ForwardSpec) -> Result<(), Error> {
            self.blocked.lock().remove(spec);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePortMonitor;

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(port: u16) -> ListenerSpec {
        ListenerSpec { protocol: Protocol::Tcp, address: "10.0.0.2".to_string(), port }
    }

    #[test]
    fn scan_reflects_whatever_was_set() {
        let monitor = FakePortMonitor::new();
        monitor.set_listeners(vec![listener(5000)]);
        assert_eq!(monitor.scan_listeners().unwrap(), vec![listener(5000)]);
    }

    #[test]
    fn block_then_unblock_round_trips() {
        let monitor = FakePortMonitor::new();
        let spec = ForwardSpec::from(&listener(5000));
        monitor.block_port(&spec).unwrap();
        assert_eq!(monitor.blocked_ports(), vec![spec.clone()]);
        monitor.unblock_port(&spec).unwrap();
        assert!(monitor.blocked_ports().is_empty());
    }
}
