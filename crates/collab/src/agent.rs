// SPDX-License-Identifier: MIT

//! The in-guest agent channel (spec §6, "Agent interface (consumed)").
//! All calls must tolerate agent-dead and machine-not-running errors
//! with the distinguished [`conman_core::ErrorKind::AgentDead`] /
//! [`conman_core::ErrorKind::NotRunning`] kinds rather than propagating
//! a raw transport error.

use async_trait::async_trait;
use conman_core::{Error, MachineId};
use std::os::unix::io::RawFd;

/// TCP or UDP, as published on the wire and used by the forward engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A single port-forward the agent is asked to proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardSpec {
    pub protocol: Protocol,
    pub guest_address: String,
    pub port: u16,
}

/// Two-stage in-guest setup run once at create time; some images need
/// a reboot between stages (spec §3).
#[derive(Debug, Clone, Default)]
pub struct InitialSetupConfig {
    pub default_username: String,
}

/// The opaque in-guest agent channel for one machine.
#[async_trait]
pub trait AgentClient: Send + Sync + 'static {
    async fn start_proxy_tcp(&self, spec: &ForwardSpec, listener_fd: RawFd) -> Result<(), Error>;
    async fn start_proxy_udp(&self, spec: &ForwardSpec, listener_fd: RawFd) -> Result<(), Error>;
    async fn stop_proxy_tcp(&self, spec: &ForwardSpec) -> Result<(), Error>;
    async fn stop_proxy_udp(&self, spec: &ForwardSpec) -> Result<(), Error>;

    async fn initial_setup_stage1(&self, config: &InitialSetupConfig) -> Result<(), Error>;
    async fn initial_setup_stage2(&self, config: &InitialSetupConfig) -> Result<(), Error>;

    async fn update_hostname(&self, hostname: &str) -> Result<(), Error>;
    fn write_hostname_files(&self, rootfs: &std::path::Path, hostname: &str) -> Result<(), Error>;
    fn resolve_ssh_dir(&self, rootfs: &std::path::Path, username: &str) -> Result<std::path::PathBuf, Error>;

    async fn dial_tcp_context(&self, address: &str) -> Result<RawFd, Error>;
    async fn serve_sftp(&self, channel_fd: RawFd) -> Result<(), Error>;

    /// Best-effort: a failure here is logged, never propagated.
    async fn synthetic_warn_stop(&self);
    async fn synthetic_wait_for_close(&self);

    async fn docker_on_vmconfig_update(&self, config_json: &serde_json::Value) -> Result<(), Error>;
    async fn docker_query_kubedns(&self, name: &str) -> Result<Vec<String>, Error>;
}

/// `id` is carried alongside so fakes can log/record per-machine
/// without the caller threading it separately.
pub trait AgentClientFactory: Send + Sync + 'static {
    type Client: AgentClient;

    fn connect(&self, id: MachineId) -> Result<Self::Client, Error>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct FakeAgentState {
        dead: bool,
        active_proxies: Vec<ForwardSpec>,
        setup_stage1_calls: u32,
        setup_stage2_calls: u32,
        hostname: Option<String>,
        warn_stop_calls: u32,
    }

    /// An in-memory [`AgentClient`]. `kill()` flips it into the
    /// agent-dead state so tests can exercise the tolerated-error paths.
    #[derive(Clone)]
    pub struct FakeAgentClient {
        state: Arc<Mutex<FakeAgentState>>,
    }

    impl Default for FakeAgentClient {
        fn default() -> Self {
            Self { state: Arc::new(Mutex::new(FakeAgentState::default())) }
        }
    }

    impl FakeAgentClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn kill(&self) {
            self.state.lock().dead = true;
        }

        pub fn active_proxies(&self) -> Vec<ForwardSpec> {
            self.state.lock().active_proxies.clone()
        }

        pub fn hostname(&self) -> Option<String> {
            self.state.lock().hostname.clone()
        }

        pub fn warn_stop_calls(&self) -> u32 {
            self.state.lock().warn_stop_calls
        }

        fn check_alive(&self, id: MachineId) -> Result<(), Error> {
            if self.state.lock().dead { Err(Error::AgentDead(id)) } else { Ok(()) }
        }
    }

    #[async_trait]
    impl AgentClient for FakeAgentClient {
        async fn start_proxy_tcp(&self, spec: &ForwardSpec, _listener_fd: RawFd) -> Result<(), Error> {
            self.state.lock().active_proxies.push(spec.clone());
            Ok(())
        }

        async fn start_proxy_udp(&self, spec: &ForwardSpec, _listener_fd: RawFd) -> Result<(), Error> {
            self.state.lock().active_proxies.push(spec.clone());
            Ok(())
        }

        async fn stop_proxy_tcp(&self, spec: &ForwardSpec) -> Result<(), Error> {
            self.state.lock().active_proxies.retain(|p| p != spec);
            Ok(())
        }

        async fn stop_proxy_udp(&self, spec: &ForwardSpec) -> Result<(), Error> {
            self.state.lock().active_proxies.retain(|p| p != spec);
            Ok(())
        }

        async fn initial_setup_stage1(&self, _config: &InitialSetupConfig) -> Result<(), Error> {
            self.state.lock().setup_stage1_calls += 1;
            Ok(())
        }

        async fn initial_setup_stage2(&self, _config: &InitialSetupConfig) -> Result<(), Error> {
            self.state.lock().setup_stage2_calls += 1;
            Ok(())
        }

        async fn update_hostname(&self, hostname: &str) -> Result<(), Error> {
            self.state.lock().hostname = Some(hostname.to_string());
            Ok(())
        }

        fn write_hostname_files(&self, _rootfs: &std::path::Path, hostname: &str) -> Result<(), Error> {
            self.state.lock().hostname = Some(hostname.to_string());
            Ok(())
        }

        fn resolve_ssh_dir(&self, rootfs: &std::path::Path, username: &str) -> Result<std::path::PathBuf, Error> {
            Ok(rootfs.join("home").join(username).join(".ssh"))
        }

        async fn dial_tcp_context(&self, _address: &str) -> Result<RawFd, Error> {
            Ok(-1)
        }

        async fn serve_sftp(&self, _channel_fd: RawFd) -> Result<(), Error> {
            Ok(())
        }

        async fn synthetic_warn_stop(&self) {
            self.state.lock().warn_stop_calls += 1;
        }

        async fn synthetic_wait_for_close(&self) {}

        async fn docker_on_vmconfig_update(&self, _config_json: &serde_json::Value) -> Result<(), Error> {
            Ok(())
        }

        async fn docker_query_kubedns(&self, _name: &str) -> Result<Vec<String>, Error> {
            Ok(Vec::new())
        }
    }

    /// Variant used by tests that want to assert `AgentDead` is
    /// surfaced with the right kind rather than a raw transport error.
    impl FakeAgentClient {
        pub async fn dead_aware_update_hostname(&self, id: MachineId, hostname: &str) -> Result<(), Error> {
            self.check_alive(id)?;
            self.update_hostname(hostname).await
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAgentClient;

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
