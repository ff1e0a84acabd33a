// SPDX-License-Identifier: MIT

//! The fixed `ErrorKind` -> JSON-RPC error code table (spec §6, §7).
//!
//! Codes below -32000 are reserved by the JSON-RPC 2.0 spec for
//! transport-level errors (parse error, invalid request, ...); this
//! table lives entirely in the -32000..-32099 "server error" band.

use conman_core::ErrorKind;

pub fn error_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NameTaken => -32000,
        ErrorKind::InvalidName => -32001,
        ErrorKind::NotFound => -32002,
        ErrorKind::NotRunning => -32003,
        ErrorKind::AgentDead => -32004,
        ErrorKind::Timeout => -32005,
        ErrorKind::Stopping => -32006,
        ErrorKind::BuiltinForbidden => -32007,
        ErrorKind::FrozenHasFreezer => -32008,
        ErrorKind::StateTransition => -32009,
        ErrorKind::Cancelled => -32010,
        ErrorKind::Unsupported => -32011,
        ErrorKind::StoreError => -32012,
        ErrorKind::ExternalProcess => -32013,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_maps_into_the_reserved_server_error_band() {
        let kinds = [
            ErrorKind::NameTaken,
            ErrorKind::InvalidName,
            ErrorKind::NotFound,
            ErrorKind::NotRunning,
            ErrorKind::AgentDead,
            ErrorKind::Timeout,
            ErrorKind::Stopping,
            ErrorKind::BuiltinForbidden,
            ErrorKind::FrozenHasFreezer,
            ErrorKind::StateTransition,
            ErrorKind::Cancelled,
            ErrorKind::Unsupported,
            ErrorKind::StoreError,
            ErrorKind::ExternalProcess,
        ];
        let mut seen = std::collections::HashSet::new();
        for kind in kinds {
            let code = error_code_for(kind);
            assert!((-32099..=-32000).contains(&code), "{kind} mapped to {code}, outside server-error band");
            assert!(seen.insert(code), "duplicate code {code} for {kind}");
        }
    }
}
