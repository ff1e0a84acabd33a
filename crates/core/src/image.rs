// SPDX-License-Identifier: MIT

//! Image specification: the 4-tuple (distro, version, architecture,
//! variant), with defaults and version-alias tables resolved at create
//! time (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A possibly-partial image specification as given by a create request.
/// Missing fields are resolved against [`default_for_distro`] and
/// [`resolve_version_alias`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub distro: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub variant: String,
}

impl ImageSpec {
    pub fn new(distro: impl Into<String>) -> Self {
        Self { distro: distro.into(), version: String::new(), arch: String::new(), variant: String::new() }
    }
}

/// Default (version, arch, variant) for a supported distro, keyed by
/// lowercase distro name.
fn defaults_table() -> &'static HashMap<&'static str, (&'static str, &'static str, &'static str)> {
    static TABLE: OnceLock<HashMap<&'static str, (&'static str, &'static str, &'static str)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("ubuntu", ("jammy", "amd64", "default")),
            ("debian", ("bookworm", "amd64", "default")),
            ("fedora", ("39", "amd64", "default")),
            ("alpine", ("3.19", "amd64", "default")),
            ("archlinux", ("latest", "amd64", "default")),
        ])
    })
}

/// Friendly aliases for a distro's version field (e.g. "latest" -> the
/// distro's current default release name).
fn alias_table() -> &'static HashMap<(&'static str, &'static str), &'static str> {
    static TABLE: OnceLock<HashMap<(&'static str, &'static str), &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (("ubuntu", "latest"), "jammy"),
            (("ubuntu", "lts"), "jammy"),
            (("debian", "latest"), "bookworm"),
            (("debian", "stable"), "bookworm"),
        ])
    })
}

/// Requested image names a distro the supervisor doesn't know how to
/// fetch/build a rootfs for.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported image distro {0:?}")]
pub struct UnsupportedImage(pub String);

/// Fill in any missing fields of `spec` from the defaults/alias tables,
/// returning a fully-resolved spec or [`UnsupportedImage`] if the distro
/// is unknown.
pub fn resolve(spec: &ImageSpec) -> Result<ImageSpec, UnsupportedImage> {
    let distro = spec.distro.to_lowercase();
    let (default_version, default_arch, default_variant) =
        defaults_table().get(distro.as_str()).copied().ok_or_else(|| UnsupportedImage(spec.distro.clone()))?;

    let mut version = if spec.version.is_empty() { default_version.to_string() } else { spec.version.clone() };
    if let Some(resolved) = alias_table().get(&(distro.as_str(), version.as_str())) {
        version = resolved.to_string();
    }

    Ok(ImageSpec {
        distro,
        version,
        arch: if spec.arch.is_empty() { default_arch.to_string() } else { spec.arch.clone() },
        variant: if spec.variant.is_empty() { default_variant.to_string() } else { spec.variant.clone() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_defaults_for_known_distro() {
        let resolved = resolve(&ImageSpec::new("ubuntu")).unwrap();
        assert_eq!(resolved.version, "jammy");
        assert_eq!(resolved.arch, "amd64");
        assert_eq!(resolved.variant, "default");
    }

    #[test]
    fn resolves_version_alias() {
        let mut spec = ImageSpec::new("ubuntu");
        spec.version = "latest".to_string();
        let resolved = resolve(&spec).unwrap();
        assert_eq!(resolved.version, "jammy");
    }

    #[test]
    fn preserves_explicit_fields() {
        let mut spec = ImageSpec::new("Debian");
        spec.version = "trixie".to_string();
        spec.arch = "arm64".to_string();
        let resolved = resolve(&spec).unwrap();
        assert_eq!(resolved.distro, "debian");
        assert_eq!(resolved.version, "trixie");
        assert_eq!(resolved.arch, "arm64");
    }

    #[test]
    fn unknown_distro_is_unsupported() {
        let err = resolve(&ImageSpec::new("plan9")).unwrap_err();
        assert_eq!(err.0, "plan9");
    }
}
