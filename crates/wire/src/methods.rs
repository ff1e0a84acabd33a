// SPDX-License-Identifier: MIT

//! Per-method request/response payloads (spec §4.10, §6). Every public
//! struct here is one JSON-RPC method's `params`/`result` pair;
//! `conman_daemon`'s dispatch table matches on the bare method name
//! string, listed next to each struct.

use crate::ContainerView;
use conman_core::{ImageSpec, MachineConfig, MachineId};
use serde::{Deserialize, Serialize};

/// `"Ping"` — liveness probe, no payload either way.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PingParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub ok: bool,
}

/// `"Create"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
    pub name: String,
    #[serde(default)]
    pub image: ImageSpec,
    #[serde(default)]
    pub config: MachineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    pub container: ContainerView,
}

/// `"ListContainers"`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListContainersParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListContainersResult {
    pub containers: Vec<ContainerView>,
}

/// `"GetByID"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByIdParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByIdResult {
    pub container: ContainerView,
}

/// `"GetByName"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByNameParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByNameResult {
    pub container: ContainerView,
}

/// `"GetDefaultContainer"`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GetDefaultContainerParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDefaultContainerResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerView>,
}

/// `"SetDefaultContainer"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultContainerParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SetDefaultContainerResult;

/// `"GetDefaultUsername"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDefaultUsernameParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDefaultUsernameResult {
    pub username: String,
}

/// `"SetDefaultUsername"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultUsernameParams {
    pub id: MachineId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SetDefaultUsernameResult;

/// `"ContainerStart"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStartParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStartResult {
    pub container: ContainerView,
}

/// `"ContainerStop"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStopParams {
    pub id: MachineId,
    #[serde(default)]
    pub kill_processes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStopResult {
    pub container: ContainerView,
}

/// `"ContainerRestart"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRestartParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRestartResult {
    pub container: ContainerView,
}

/// `"ContainerDelete"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDeleteParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContainerDeleteResult;

/// `"ContainerRename"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRenameParams {
    pub id: MachineId,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRenameResult {
    pub container: ContainerView,
}

/// `"ContainerGetLogs"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerGetLogsParams {
    pub id: MachineId,
    #[serde(default)]
    pub tail_lines: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerGetLogsResult {
    pub log: String,
    pub log_console: String,
}

/// `"InternalReportStopped"` — called by the in-VM post-stop hook.
/// Must be idempotent: reporting an already-stopped machine is a no-op,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalReportStoppedParams {
    pub id: MachineId,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InternalReportStoppedResult;

/// Docker subsystem hooks, routed through the in-VM internal endpoint.
pub mod docker {
    use serde::{Deserialize, Serialize};

    /// `"DockerLoadImage"`
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoadImageParams {
        pub archive_path: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoadImageResult {
        pub image_id: String,
    }

    /// `"DockerSyncServer"` — guest-helper channel pushing
    /// container/image/volume change diffs (spec §6).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SyncServerParams {
        pub containers_changed: Vec<String>,
        pub images_changed: Vec<String>,
        pub volumes_changed: Vec<String>,
    }

    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct SyncServerResult;

    /// `"DockerDf"` — disk-usage summary.
    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct DfParams;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DfResult {
        pub images_bytes: u64,
        pub containers_bytes: u64,
        pub volumes_bytes: u64,
    }

    /// `"DockerK8sDelete"` — Kubernetes-builtin teardown hook.
    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct K8sDeleteParams;

    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct K8sDeleteResult;

    /// `"DockerUiReportedStart"` — acknowledges a UI-initiated start so
    /// the freezer's idle predicate doesn't immediately re-suspend it.
    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct UiReportedStartParams;

    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
    pub struct UiReportedStartResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_params_round_trip_with_default_image_and_config() {
        let json = serde_json::json!({ "name": "ubuntu" });
        let params: CreateParams = serde_json::from_value(json).unwrap();
        assert_eq!(params.name, "ubuntu");
        assert_eq!(params.image, ImageSpec::default());
    }

    #[test]
    fn get_default_container_result_omits_container_when_none() {
        let result = GetDefaultContainerResult { container: None };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.as_object().unwrap().get("container").is_none());
    }
}
