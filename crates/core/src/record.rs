// SPDX-License-Identifier: MIT

//! The persisted machine record (spec §3).

use crate::id::MachineId;
use crate::image::ImageSpec;
use crate::state::MachineState;
use serde::{Deserialize, Serialize};

/// Mutable, machine-scoped configuration carried in the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Isolated machines get no default port-forwarding or NFS bind.
    #[serde(default)]
    pub isolated: bool,
    #[serde(default)]
    pub default_username: String,
}

/// Which builtin role, if any, a machine plays. Builtin machines are
/// persisted but most mutable fields are ignored on load (spec §3), and
/// they cannot be deleted/cloned/exported/renamed except that the
/// Docker builtin's data directories may be wiped as a special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Docker,
    Kubernetes,
}

impl Builtin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Builtin::Docker => "docker",
            Builtin::Kubernetes => "kubernetes",
        }
    }
}

/// `{id, name, image, config, builtin, state}` — the persisted shape of
/// a machine (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: MachineId,
    pub name: String,
    pub image: ImageSpec,
    pub config: MachineConfig,
    #[serde(default)]
    pub builtin: Option<Builtin>,
    pub state: MachineState,
}

impl MachineRecord {
    pub fn is_builtin(&self) -> bool {
        self.builtin.is_some()
    }

    /// The Docker builtin's data directories may be wiped even though the
    /// record as a whole can't be deleted — spec's one documented
    /// exception to "builtins cannot be deleted".
    pub fn allows_data_wipe(&self) -> bool {
        matches!(self.builtin, Some(Builtin::Docker))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl MachineRecord {
    pub fn test_new(name: impl Into<String>, image: ImageSpec) -> Self {
        Self {
            id: MachineId::new(),
            name: name.into(),
            image,
            config: MachineConfig::default(),
            builtin: None,
            state: MachineState::Creating,
        }
    }
}
