// SPDX-License-Identifier: MIT

//! Machine identity: an immutable, sortable 26-character identifier.

use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique, sortable, immutable identifier for a machine.
///
/// Backed by a ULID: 26 Crockford-base32 characters, lexically sortable
/// by creation time. Unlike the mutable machine *name*, the ID never
/// changes for the lifetime of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineId(Ulid);

impl MachineId {
    /// Generate a new, time-ordered ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse an existing ID (e.g. read back from the store or the wire).
    pub fn parse(s: &str) -> Result<Self, InvalidMachineId> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| InvalidMachineId(s.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MachineId {
    type Err = InvalidMachineId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for MachineId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MachineId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MachineId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A string that does not parse as a 26-character ULID.
#[derive(Debug, Clone)]
pub struct InvalidMachineId(pub String);

impl fmt::Display for InvalidMachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid machine id: {:?}", self.0)
    }
}

impl std::error::Error for InvalidMachineId {}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
