// SPDX-License-Identifier: MIT

//! Test builders shared across crates. Gated behind `test-support`.

use crate::id::MachineId;
use crate::image::ImageSpec;
use crate::record::{Builtin, MachineConfig, MachineRecord};
use crate::state::MachineState;

/// Builder for [`MachineRecord`] fixtures.
pub struct MachineRecordBuilder {
    id: MachineId,
    name: String,
    image: ImageSpec,
    config: MachineConfig,
    builtin: Option<Builtin>,
    state: MachineState,
}

impl Default for MachineRecordBuilder {
    fn default() -> Self {
        Self {
            id: MachineId::new(),
            name: "test-machine".to_string(),
            image: ImageSpec::new("ubuntu"),
            config: MachineConfig::default(),
            builtin: None,
            state: MachineState::Stopped,
        }
    }
}

impl MachineRecordBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(mut self, id: MachineId) -> Self {
        self.id = id;
        self
    }

    pub fn image(mut self, image: ImageSpec) -> Self {
        self.image = image;
        self
    }

    pub fn state(mut self, state: MachineState) -> Self {
        self.state = state;
        self
    }

    pub fn builtin(mut self, builtin: Builtin) -> Self {
        self.builtin = Some(builtin);
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.config.isolated = isolated;
        self
    }

    pub fn build(self) -> MachineRecord {
        MachineRecord {
            id: self.id,
            name: self.name,
            image: self.image,
            config: self.config,
            builtin: self.builtin,
            state: self.state,
        }
    }
}

impl MachineRecord {
    pub fn builder() -> MachineRecordBuilder {
        MachineRecordBuilder::default()
    }
}
