use crate::infrastructure::error::InfraError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

pub type RefreshOutcome = Result<String, String>;

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

pub enum RefreshTicket<'a> {
    Leader(RefreshLease<'a>),
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    pub fn pending(&self) -> usize {
        match &*self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    pub fn begin(&self) -> RefreshTicket<'_> {
        let mut state = self.lock();
        match &mut *state {
            RefreshState::Refreshing { waiters } => {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                debug!(queued = waiters.len(), "request queued behind running refresh");
                RefreshTicket::Follower(receiver)
            }
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: Vec::new(),
                };
                RefreshTicket::Leader(RefreshLease {
                    coordinator: self,
                    settled: false,
                })
            }
        }
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = match std::mem::take(&mut *self.lock()) {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing { waiters } => waiters,
        };
        let released = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        debug!(released, succeeded = outcome.is_ok(), "refresh settled");
        released
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Dropping an unsettled lease fails every waiter.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    pub fn succeed(mut self, token: &str) -> usize {
        self.settled = true;
        self.coordinator.settle(Ok(token.to_string()))
    }

    pub fn fail(mut self, reason: impl Into<String>) -> usize {
        self.settled = true;
        self.coordinator.settle(Err(reason.into()))
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(Err("session refresh was abandoned".to_string()));
        }
    }
}

pub async fn await_refresh(receiver: oneshot::Receiver<RefreshOutcome>) -> Result<String, InfraError> {
    match receiver.await {
        Ok(Ok(token)) => Ok(token),
        Ok(Err(reason)) => Err(InfraError::Unauthorized {
            status: 401,
            message: format!("session refresh failed: {reason}"),
        }),
        Err(_) => Err(InfraError::Unauthorized {
            status: 401,
            message: "session refresh ended without a result".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_leader(ticket: RefreshTicket<'_>) -> RefreshLease<'_> {
        match ticket {
            RefreshTicket::Leader(lease) => lease,
            RefreshTicket::Follower(_) => panic!("expected leader"),
        }
    }

    fn expect_follower(ticket: RefreshTicket<'_>) -> oneshot::Receiver<RefreshOutcome> {
        match ticket {
            RefreshTicket::Follower(receiver) => receiver,
            RefreshTicket::Leader(_) => panic!("expected follower"),
        }
    }

    #[tokio::test]
    async fn one_leader_and_ordered_release() {
        let coordinator = RefreshCoordinator::new();
        let lease = expect_leader(coordinator.begin());
        let first = expect_follower(coordinator.begin());
        let second = expect_follower(coordinator.begin());
        assert!(coordinator.is_refreshing());
        assert_eq!(coordinator.pending(), 2);

        assert_eq!(lease.succeed("fresh"), 2);
        assert!(!coordinator.is_refreshing());
        assert_eq!(await_refresh(first).await.expect("first"), "fresh");
        assert_eq!(await_refresh(second).await.expect("second"), "fresh");

        // The next 401 after settling starts a new refresh.
        let _lease = expect_leader(coordinator.begin());
    }

    #[tokio::test]
    async fn failure_rejects_every_waiter() {
        let coordinator = RefreshCoordinator::new();
        let lease = expect_leader(coordinator.begin());
        let waiter = expect_follower(coordinator.begin());

        lease.fail("refresh token expired");
        let error = await_refresh(waiter).await.expect_err("waiter fails");
        assert!(error.is_unauthorized());
        assert!(error.to_string().contains("refresh token expired"));
    }

    #[tokio::test]
    async fn dropped_lease_returns_to_idle() {
        let coordinator = RefreshCoordinator::new();
        let waiter = {
            let _lease = expect_leader(coordinator.begin());
            expect_follower(coordinator.begin())
        };
        assert!(!coordinator.is_refreshing());
        assert!(await_refresh(waiter).await.is_err());
    }
}
