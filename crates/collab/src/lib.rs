// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conman-collab: trait seams for everything the supervisor consumes
//! from outside the VM-local process — the container engine, the
//! in-guest agent, the host controller link, mDNS/NFS registration,
//! the BPF port monitor, and the image fetcher (spec §6 "interfaces
//! consumed"). Behind the `test-support` feature, each seam also ships
//! an in-memory fake so `conman-engine` and `conman-daemon` tests never
//! need a real VM.

pub mod agent;
pub mod bpf;
pub mod engine;
pub mod host_controller;
pub mod image_fetch;
pub mod registrar;

pub use agent::{AgentClient, AgentClientFactory, ForwardSpec, InitialSetupConfig, Protocol};
pub use bpf::{ListenerSpec, PortMonitor};
pub use engine::{AttachOptions, ContainerEngine, ContainerEngineFactory, IpAddress};
pub use host_controller::{DrmAcceptor, DrmResult, HostControllerClient};
pub use image_fetch::ImageFetcher;
pub use registrar::{MdnsRegistrar, NfsRegistrar};

#[cfg(any(test, feature = "test-support"))]
pub use agent::FakeAgentClient;
#[cfg(any(test, feature = "test-support"))]
pub use bpf::FakePortMonitor;
#[cfg(any(test, feature = "test-support"))]
pub use engine::FakeContainerEngine;
#[cfg(any(test, feature = "test-support"))]
pub use host_controller::FakeHostControllerClient;
#[cfg(any(test, feature = "test-support"))]
pub use image_fetch::FakeImageFetcher;
#[cfg(any(test, feature = "test-support"))]
pub use registrar::FakeRegistrar;
