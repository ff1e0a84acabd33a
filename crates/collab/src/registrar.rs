// SPDX-License-Identifier: MIT

//! mDNS and NFS registration hooks. The container manager calls these
//! at create/restore time (register), at start/stop (bind/unbind), and
//! as a pre-delete hook (deregister) — see spec §4.6, §3 lifecycles.

use conman_core::MachineId;

/// Advertises a machine's name (and configured aliases) over mDNS.
pub trait MdnsRegistrar: Send + Sync + 'static {
    fn register(&self, id: MachineId, name: &str, aliases: &[String]);
    fn deregister(&self, id: MachineId);
}

/// Binds/unbinds a machine's data into the host-visible NFS export.
/// Isolated machines (`config.isolated`) never call `bind`.
pub trait NfsRegistrar: Send + Sync + 'static {
    fn bind(&self, id: MachineId, name: &str);
    fn unbind(&self, id: MachineId);
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// An in-memory [`MdnsRegistrar`] + [`NfsRegistrar`] that just
    /// tracks which machine IDs are currently registered/bound, so
    /// tests can assert "removed from mDNS" / "NFS unbound" directly.
    #[derive(Clone, Default)]
    pub struct FakeRegistrar {
        mdns: Arc<Mutex<HashSet<MachineId>>>,
        nfs: Arc<Mutex<HashSet<MachineId>>>,
    }

    impl FakeRegistrar {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_mdns_registered(&self, id: MachineId) -> bool {
            self.mdns.lock().contains(&id)
        }

        pub fn is_nfs_bound(&self, id: MachineId) -> bool {
            self.nfs.lock().contains(&id)
        }
    }

    impl MdnsRegistrar for FakeRegistrar {
        fn register(&self, id: MachineId, _name: &str, _aliases: &[String]) {
            self.mdns.lock().insert(id);
        }

        fn deregister(&self, id: MachineId) {
            self.mdns.lock().remove(&id);
        }
    }

    impl NfsRegistrar for FakeRegistrar {
        fn bind(&self, id: MachineId, _name: &str) {
            self.nfs.lock().insert(id);
        }

        fn unbind(&self, id: MachineId) {
            self.nfs.lock().remove(&id);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRegistrar;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_deregister_round_trips() {
        let registrar = FakeRegistrar::new();
        let id = MachineId::new();
        registrar.register(id, "ubuntu", &[]);
        assert!(registrar.is_mdns_registered(id));
        registrar.deregister(id);
        assert!(!registrar.is_mdns_registered(id));
    }

    #[test]
    fn bind_then_unbind_round_trips() {
        let registrar = FakeRegistrar::new();
        let id = MachineId::new();
        registrar.bind(id, "ubuntu");
        assert!(registrar.is_nfs_bound(id));
        registrar.unbind(id);
        assert!(!registrar.is_nfs_bound(id));
    }
}
