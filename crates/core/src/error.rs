// SPDX-License-Identifier: MIT

//! The error taxonomy the core must distinguish (spec §7).
//!
//! Collaborator errors are wrapped with a short contextual tag but keep
//! their root kind via `#[source]`, so a caller further up the stack can
//! still match on `Error::kind()` after a `.context("copy rootfs")`-style
//! wrap.

use crate::id::MachineId;

/// Coarse-grained error kind, used by RPC dispatch to pick a wire error
/// code and by callers that need to branch on failure category without
/// string-matching a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NameTaken,
    InvalidName,
    NotFound,
    NotRunning,
    AgentDead,
    Timeout,
    Stopping,
    BuiltinForbidden,
    FrozenHasFreezer,
    StateTransition,
    Cancelled,
    Unsupported,
    StoreError,
    ExternalProcess,
}

crate::simple_display! {
    ErrorKind {
        NameTaken => "name_taken",
        InvalidName => "invalid_name",
        NotFound => "not_found",
        NotRunning => "not_running",
        AgentDead => "agent_dead",
        Timeout => "timeout",
        Stopping => "stopping",
        BuiltinForbidden => "builtin_forbidden",
        FrozenHasFreezer => "frozen_has_freezer",
        StateTransition => "state_transition",
        Cancelled => "cancelled",
        Unsupported => "unsupported",
        StoreError => "store_error",
        ExternalProcess => "external_process",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("name {0:?} is already in use")]
    NameTaken(String),

    #[error("invalid name {0:?}: {1}")]
    InvalidName(String, &'static str),

    #[error("machine {0} not found")]
    NotFoundById(MachineId),

    #[error("machine {0:?} not found")]
    NotFoundByName(String),

    #[error("machine {0} is not running")]
    NotRunning(MachineId),

    #[error("machine {0} agent is no longer reachable")]
    AgentDead(MachineId),

    #[error("{op} on machine {id} timed out after {elapsed:?}")]
    Timeout { id: MachineId, op: &'static str, elapsed: std::time::Duration },

    #[error("manager is shutting down")]
    Stopping,

    #[error("operation {0:?} is forbidden on builtin machine {1}")]
    BuiltinForbidden(&'static str, MachineId),

    #[error("operation {0:?} is forbidden on a machine with a freezer")]
    FrozenHasFreezer(&'static str),

    #[error("cannot transition machine {id} from {from:?} to {to:?} (internal={is_internal})")]
    StateTransition { id: MachineId, from: crate::state::MachineState, to: crate::state::MachineState, is_internal: bool },

    #[error("operation on machine {0} was cancelled")]
    Cancelled(MachineId),

    #[error("{0} is not supported, falling back to the slow path")]
    Unsupported(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("external process {program:?} failed: {stderr}")]
    ExternalProcess { program: String, stderr: String },

    #[error("{context}: {source}")]
    Context { context: String, #[source] source: Box<Error> },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NameTaken(_) => ErrorKind::NameTaken,
            Error::InvalidName(..) => ErrorKind::InvalidName,
            Error::NotFoundById(_) | Error::NotFoundByName(_) => ErrorKind::NotFound,
            Error::NotRunning(_) => ErrorKind::NotRunning,
            Error::AgentDead(_) => ErrorKind::AgentDead,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Stopping => ErrorKind::Stopping,
            Error::BuiltinForbidden(..) => ErrorKind::BuiltinForbidden,
            Error::FrozenHasFreezer(_) => ErrorKind::FrozenHasFreezer,
            Error::StateTransition { .. } => ErrorKind::StateTransition,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Store(_) => ErrorKind::StoreError,
            Error::ExternalProcess { .. } => ErrorKind::ExternalProcess,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap this error with a short contextual tag, preserving `kind()`.
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context { context: context.into(), source: Box::new(self) }
    }
}

/// Errors surfaced by the persistence facade (C1).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Helper for attaching context to a `Result<_, Error>` in call chains,
/// mirroring the `fmt.Errorf("copy rootfs: %w", err)` style the
/// original supervisor used.
pub trait ResultExt<T> {
    fn ctx(self, context: impl Into<String>) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn ctx(self, context: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.context(context))
    }
}
