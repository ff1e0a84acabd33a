// SPDX-License-Identifier: MIT

//! The container-engine seam: the low-level process supervisor this
//! crate drives to actually run a machine's init (spec §6,
//! "Container-engine interface (consumed)"). Real implementations wrap
//! whatever sits under the VM (a liblxc-style engine); this crate only
//! defines the trait and, under `test-support`, an in-memory fake.

use async_trait::async_trait;
use conman_core::{Error, MachineState};
use std::path::PathBuf;
use std::time::Duration;

/// One of a machine's network interfaces as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddress {
    pub interface: String,
    pub address: String,
}

/// An extra file descriptor handed across the attach boundary.
pub type ExtraFd = std::os::unix::io::RawFd;

/// Options for [`ContainerEngine::attach_run_command`].
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
}

/// The liblxc-shaped engine handle for one machine. One instance per
/// machine, created by [`ContainerEngine::new`] and held for the
/// machine's lifetime.
#[async_trait]
pub trait ContainerEngine: Send + Sync + 'static {
    fn set_log_file(&self, path: &PathBuf) -> Result<(), Error>;
    fn set_config_item(&self, key: &str, value: &str) -> Result<(), Error>;
    fn add_device_node(&self, src: &str, dst: &str) -> Result<(), Error>;
    fn devpts_fd(&self) -> Result<ExtraFd, Error>;

    async fn start(&self) -> Result<(), Error>;
    async fn stop(&self) -> Result<(), Error>;
    async fn shutdown(&self, timeout: Duration) -> Result<(), Error>;
    async fn wait(&self, state: MachineState, timeout: Duration) -> Result<(), Error>;

    fn running(&self) -> bool;
    fn state(&self) -> MachineState;
    fn init_pid(&self) -> Option<u32>;
    fn init_pidfd(&self) -> Result<ExtraFd, Error>;
    fn ip_addresses(&self) -> Vec<IpAddress>;

    async fn attach_run_command(
        &self,
        argv: &[String],
        opts: &AttachOptions,
        extra_fd: Option<ExtraFd>,
    ) -> Result<i32, Error>;

    async fn freeze(&self) -> Result<(), Error>;
    async fn unfreeze(&self) -> Result<(), Error>;
}

/// A factory that builds the engine handle for a freshly-restored
/// machine (`new(id, dir)` in spec §6).
pub trait ContainerEngineFactory: Send + Sync + 'static {
    type Engine: ContainerEngine;

    fn new_engine(&self, id: conman_core::MachineId, dir: &PathBuf) -> Result<Self::Engine, Error>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct FakeEngineState {
        running: bool,
        state: Option<MachineState>,
        init_pid: Option<u32>,
        frozen: bool,
        config: Vec<(String, String)>,
        attach_calls: Vec<Vec<String>>,
    }

    /// An in-memory [`ContainerEngine`] driven entirely by test code —
    /// `start`/`stop` flip `running` and `state` rather than touching a
    /// real init process.
    #[derive(Clone)]
    pub struct FakeContainerEngine {
        state: Arc<Mutex<FakeEngineState>>,
    }

    impl Default for FakeContainerEngine {
        fn default() -> Self {
            Self { state: Arc::new(Mutex::new(FakeEngineState::default())) }
        }
    }

    impl FakeContainerEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_frozen(&self) -> bool {
            self.state.lock().frozen
        }

        pub fn attach_calls(&self) -> Vec<Vec<String>> {
            self.state.lock().attach_calls.clone()
        }

        pub fn config_items(&self) -> Vec<(String, String)> {
            self.state.lock().config.clone()
        }

        /// Test hook: simulate the engine's init dying out from under us,
        /// as the watchdog test scenario requires.
        pub fn simulate_init_death(&self) {
            let mut s = self.state.lock();
            s.running = false;
            s.init_pid = None;
        }
    }

    #[async_trait]
    impl ContainerEngine for FakeContainerEngine {
        fn set_log_file(&self, _path: &PathBuf) -> Result<(), Error> {
            Ok(())
        }

        fn set_config_item(&self, key: &str, value: &str) -> Result<(), Error> {
            self.state.lock().config.push((key.to_string(), value.to_string()));
            Ok(())
        }

        fn add_device_node(&self, _src: &str, _dst: &str) -> Result<(), Error> {
            Ok(())
        }

        fn devpts_fd(&self) -> Result<ExtraFd, Error> {
            Ok(-1)
        }

        async fn start(&self) -> Result<(), Error> {
            let mut s = self.state.lock();
            s.running = true;
            s.init_pid = Some(4242);
            Ok(())
        }

        async fn stop(&self) -> Result<(), Error> {
            let mut s = self.state.lock();
            s.running = false;
            s.init_pid = None;
            Ok(())
        }

        async fn shutdown(&self, _timeout: Duration) -> Result<(), Error> {
            self.stop().await
        }

        async fn wait(&self, state: MachineState, _timeout: Duration) -> Result<(), Error> {
            let running = self.state.lock().running;
            match state {
                MachineState::Running if running => Ok(()),
                MachineState::Stopped if !running => Ok(()),
                _ => Err(Error::Timeout {
                    id: conman_core::MachineId::new(),
                    op: "wait",
                    elapsed: Duration::from_secs(0),
                }),
            }
        }

        fn running(&self) -> bool {
            self.state.lock().running
        }

        fn state(&self) -> MachineState {
            if self.state.lock().running { MachineState::Running } else { MachineState::Stopped }
        }

        fn init_pid(&self) -> Option<u32> {
            self.state.lock().init_pid
        }

        fn init_pidfd(&self) -> Result<ExtraFd, Error> {
            Ok(-1)
        }

        fn ip_addresses(&self) -> Vec<IpAddress> {
            vec![IpAddress { interface: "eth0".to_string(), address: "10.0.0.2".to_string() }]
        }

        async fn attach_run_command(
            &self,
            argv: &[String],
            _opts: &AttachOptions,
            _extra_fd: Option<ExtraFd>,
        ) -> Result<i32, Error> {
            self.state.lock().attach_calls.push(argv.to_vec());
            Ok(0)
        }

        async fn freeze(&self) -> Result<(), Error> {
            self.state.lock().frozen = true;
            Ok(())
        }

        async fn unfreeze(&self) -> Result<(), Error> {
            self.state.lock().frozen = false;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeContainerEngine;

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
