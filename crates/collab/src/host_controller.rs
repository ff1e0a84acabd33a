// SPDX-License-Identifier: MIT

//! The outbound half of the host link: calls the supervisor makes
//! *to* the host controller (starting/stopping forwards, reporting
//! DRM acceptance) as opposed to the inbound RPC surface the host
//! controller calls into us on (that's `conman-wire` + the daemon's
//! dispatch table).

use crate::agent::ForwardSpec;
use async_trait::async_trait;
use conman_core::Error;

/// Calls the supervisor makes outward to the host controller.
#[async_trait]
pub trait HostControllerClient: Send + Sync + 'static {
    async fn start_forward(&self, spec: &ForwardSpec) -> Result<(), Error>;
    async fn stop_forward(&self, spec: &ForwardSpec) -> Result<(), Error>;
}

/// The small DRM/entitlement result-acceptance state machine the spec
/// keeps in scope as "a small peripheral" even though DRM decisions
/// themselves are out of scope (spec §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrmResult {
    Pending,
    Accepted,
    Rejected,
}

/// Accepts host-reported DRM results; does not evaluate entitlement
/// policy itself. `report` is idempotent: reporting the same result
/// twice is a no-op, and a `Rejected` verdict is terminal (further
/// reports are ignored).
#[derive(Debug, Default)]
pub struct DrmAcceptor {
    state: parking_lot::Mutex<DrmResult>,
}

impl DrmAcceptor {
    pub fn new() -> Self {
        Self { state: parking_lot::Mutex::new(DrmResult::Pending) }
    }

    pub fn current(&self) -> DrmResult {
        *self.state.lock()
    }

    pub fn report(&self, result: DrmResult) {
        let mut state = self.state.lock();
        if *state != DrmResult::Rejected {
            *state = result;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct FakeHostControllerState {
        active: Vec<ForwardSpec>,
        start_calls: u32,
        stop_calls: u32,
        fail_next_start: bool,
    }

    /// An in-memory [`HostControllerClient`]. `fail_next_start` lets
    /// tests exercise the forward-rollback path (spec §8: "A forward
    /// whose host-controller StartForward fails is rolled back").
    #[derive(Clone)]
    pub struct FakeHostControllerClient {
        state: Arc<Mutex<FakeHostControllerState>>,
    }

    impl Default for FakeHostControllerClient {
        fn default() -> Self {
            Self { state: Arc::new(Mutex::new(FakeHostControllerState::default())) }
        }
    }

    impl FakeHostControllerClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_start(&self) {
            self.state.lock().fail_next_start = true;
        }

        pub fn active_forwards(&self) -> Vec<ForwardSpec> {
            self.state.lock().active.clone()
        }

        pub fn start_calls(&self) -> u32 {
            self.state.lock().start_calls
        }

        pub fn stop_calls(&self) -> u32 {
            self.state.lock().stop_calls
        }
    }

    #[async_trait]
    impl HostControllerClient for FakeHostControllerClient {
        async fn start_forward(&self, spec: &ForwardSpec) -> Result<(), Error> {
            let mut s = self.state.lock();
            s.start_calls += 1;
            if s.fail_next_start {
                s.fail_next_start = false;
                return Err(Error::Unsupported("host controller rejected forward"));
            }
            s.active.push(spec.clone());
            Ok(())
        }

        async fn stop_forward(&self, spec: &ForwardSpec) -> Result<(), Error> {
            let mut s = self.state.lock();
            s.stop_calls += 1;
            s.active.retain(|f| f != spec);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHostControllerClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drm_acceptor_starts_pending() {
        let acceptor = DrmAcceptor::new();
        assert_eq!(acceptor.current(), DrmResult::Pending);
    }

    #[test]
    fn rejected_is_terminal() {
        let acceptor = DrmAcceptor::new();
        acceptor.report(DrmResult::Rejected);
        acceptor.report(DrmResult::Accepted);
        assert_eq!(acceptor.current(), DrmResult::Rejected);
    }

    #[test]
    fn accepted_can_still_be_updated_before_rejection() {
        let acceptor = DrmAcceptor::new();
        acceptor.report(DrmResult::Accepted);
        acceptor.report(DrmResult::Pending);
        assert_eq!(acceptor.current(), DrmResult::Pending);
    }
}
