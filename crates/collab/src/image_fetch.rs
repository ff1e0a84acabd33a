// SPDX-License-Identifier: MIT

//! Rootfs materialization. Image *distribution* is explicitly out of
//! scope (spec §1 Non-goals) — this seam only covers handing the
//! container manager a populated rootfs directory for a resolved
//! [`ImageSpec`]; where that rootfs comes from (cache, network fetch,
//! local build) is the real implementation's business.

use async_trait::async_trait;
use conman_core::{Error, ImageSpec};
use std::path::Path;

#[async_trait]
pub trait ImageFetcher: Send + Sync + 'static {
    /// Populate `dest` (an empty, already-created directory) with the
    /// rootfs for `spec`. Must be safely retryable: a failure partway
    /// through leaves `dest` in a state the caller can delete and
    /// retry without special-casing.
    async fn materialize_rootfs(&self, spec: &ImageSpec, dest: &Path) -> Result<(), Error>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// An in-memory [`ImageFetcher`] that just drops a marker file,
    /// optionally failing for a distro configured via
    /// [`FakeImageFetcher::fail_for`].
    #[derive(Clone, Default)]
    pub struct FakeImageFetcher {
        fail_distros: Arc<Mutex<std::collections::HashSet<String>>>,
        calls: Arc<Mutex<Vec<ImageSpec>>>,
    }

    impl FakeImageFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(&self, distro: impl Into<String>) {
            self.fail_distros.lock().insert(distro.into());
        }

        pub fn calls(&self) -> Vec<ImageSpec> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeImageFetcher {
        async fn materialize_rootfs(&self, spec: &ImageSpec, dest: &std::path::Path) -> Result<(), Error> {
            self.calls.lock().push(spec.clone());
            if self.fail_distros.lock().contains(&spec.distro) {
                return Err(Error::ExternalProcess {
                    program: "image-fetch".to_string(),
                    stderr: format!("no rootfs available for {}", spec.distro),
                });
            }
            std::fs::create_dir_all(dest)
                .map_err(|e| Error::ExternalProcess { program: "mkdir".to_string(), stderr: e.to_string() })?;
            std::fs::write(dest.join(".fake-rootfs-marker"), b"ok")
                .map_err(|e| Error::ExternalProcess { program: "write".to_string(), stderr: e.to_string() })?;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeImageFetcher;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn materialize_creates_a_marker_file() {
        let fetcher = fake::FakeImageFetcher::new();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("rootfs");
        fetcher.materialize_rootfs(&ImageSpec::new("ubuntu"), &dest).await.unwrap();
        assert!(dest.join(".fake-rootfs-marker").exists());
    }

    #[tokio::test]
    async fn configured_failure_distro_errors() {
        let fetcher = fake::FakeImageFetcher::new();
        fetcher.fail_for("plan9");
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher.materialize_rootfs(&ImageSpec::new("plan9"), &dir.path().join("rootfs")).await.unwrap_err();
        assert_eq!(err.kind(), conman_core::ErrorKind::ExternalProcess);
    }
}
