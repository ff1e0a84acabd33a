// SPDX-License-Identifier: MIT

//! The wire shape of a container record: "the persisted record plus
//! the current state string" (spec §6).

use conman_core::{ImageSpec, MachineConfig, MachineId, MachineRecord, MachineState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerView {
    pub id: MachineId,
    pub name: String,
    pub image: ImageSpec,
    pub config: MachineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<String>,
    pub state: MachineState,
}

impl From<&MachineRecord> for ContainerView {
    fn from(record: &MachineRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            image: record.image.clone(),
            config: record.config.clone(),
            builtin: record.builtin.map(|b| b.as_str().to_string()),
            state: record.state,
        }
    }
}

impl From<MachineRecord> for ContainerView {
    fn from(record: MachineRecord) -> Self {
        Self::from(&record)
    }
}
