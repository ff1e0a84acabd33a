// SPDX-License-Identifier: MIT

//! Machine name validation (spec §3, §6: `^[a-zA-Z0-9_-]+$`, not blacklisted).

use std::sync::OnceLock;

/// Names reserved by the platform; never assignable to a user machine.
pub const RESERVED_NAMES: &[&str] = &["default", "host", "docker", "k8s", "kubernetes"];

#[allow(clippy::expect_used)]
fn name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-zA-Z0-9_-]+$").expect("constant regex pattern is valid"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name must match ^[a-zA-Z0-9_-]+$")]
    InvalidFormat,
    #[error("name is reserved")]
    Reserved,
    #[error("name must not be empty")]
    Empty,
}

/// Validate a candidate machine name against the format regex and the
/// reserved-name blacklist. Does not check uniqueness — that is the
/// container manager's job, since it requires the registry.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if !name_regex().is_match(name) {
        return Err(NameError::InvalidFormat);
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(NameError::Reserved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        plain = { "ubuntu" },
        with_digits = { "ubuntu2" },
        with_dash = { "my-machine" },
        with_underscore = { "my_machine" },
    )]
    fn accepts_valid_names(name: &str) {
        assert!(validate_name(name).is_ok());
    }

    #[yare::parameterized(
        empty = { "", NameError::Empty },
        spaces = { "my machine", NameError::InvalidFormat },
        dot = { "my.machine", NameError::InvalidFormat },
        slash = { "my/machine", NameError::InvalidFormat },
        reserved_default = { "default", NameError::Reserved },
        reserved_host = { "host", NameError::Reserved },
        reserved_docker = { "docker", NameError::Reserved },
    )]
    fn rejects_invalid_names(name: &str, expected: NameError) {
        assert_eq!(validate_name(name), Err(expected));
    }
}
