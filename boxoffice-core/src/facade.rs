use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::ReservationTransition;
use crate::error::ReservationError;
use crate::lock::{holder_token, LockCoordinator, LockGuard, LockHandle, LockPolicy};
use crate::models::{Booking, ReservationRequest};

/// Runs one reservation transition under the ticket's distributed lock.
///
/// Per attempt: `Acquiring → (TimedOut | Held) → Released`, ending in a booking,
/// `Congested`, `AlreadyReserved`, a fault or `Cancelled`. Once the lock is held it
/// is released before this returns, whatever the transition did.
pub struct LockedReservationFacade {
    coordinator: Arc<dyn LockCoordinator>,
    transition: Arc<dyn ReservationTransition>,
    policy: LockPolicy,
}

impl LockedReservationFacade {
    pub fn new(
        coordinator: Arc<dyn LockCoordinator>,
        transition: Arc<dyn ReservationTransition>,
        policy: LockPolicy,
    ) -> Self {
        Self {
            coordinator,
            transition,
            policy,
        }
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub async fn reserve_with_lock(&self, request: &ReservationRequest) -> Result<Booking, ReservationError> {
        self.reserve_with_lock_until(request, std::future::pending::<()>()).await
    }

    /// Like [`Self::reserve_with_lock`], but gives up with `Cancelled` if `cancelled`
    /// completes while still queueing for the lock. Once the lock is held the
    /// transition runs to completion.
    pub async fn reserve_with_lock_until<C>(
        &self,
        request: &ReservationRequest,
        cancelled: C,
    ) -> Result<Booking, ReservationError>
    where
        C: Future<Output = ()> + Send,
    {
        let ticket_id = &request.ticket_id;
        let lock_key = self.policy.lock_key(ticket_id);
        let holder_token = holder_token();
        tokio::pin!(cancelled);

        let acquired = tokio::select! {
            biased;
            _ = &mut cancelled => {
                info!(%ticket_id, %holder_token, requester_id = %request.requester_id, "Reservation cancelled while waiting for lock");
                self.abandon_claim(&lock_key, &holder_token);
                return Err(ReservationError::Cancelled);
            }
            acquired = self.coordinator.acquire(
                &lock_key,
                &holder_token,
                self.policy.wait_timeout,
                self.policy.lease_timeout,
            ) => acquired,
        };

        let handle = match acquired {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                info!(%ticket_id, requester_id = %request.requester_id, "Lock acquisition failed, too many waiters");
                return Err(ReservationError::Congested(ticket_id.clone()));
            }
            Err(e) => {
                error!(%ticket_id, %lock_key, %holder_token, kind = "coordinator_fault", error = %e, "Lock coordinator fault");
                self.abandon_claim(&lock_key, &holder_token);
                return Err(e.into());
            }
        };

        let guard = LockGuard::new(Arc::clone(&self.coordinator), handle);

        let outcome = match AssertUnwindSafe(self.transition.reserve(request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => Err(ReservationError::Internal(panic_message(payload.as_ref()))),
        };

        let lease_overrun = guard.handle().map(LockHandle::is_expired).unwrap_or(false);
        match guard.release().await {
            Ok(true) => debug!(%ticket_id, %holder_token, "Lock released"),
            Ok(false) => warn!(
                %ticket_id,
                %holder_token,
                lease_overrun,
                "Lock no longer held at release, lease expired during the transition"
            ),
            Err(e) => warn!(%ticket_id, %holder_token, error = %e, "Lock release failed, lease will expire"),
        }

        if let Err(e) = &outcome {
            if e.is_fault() {
                error!(%ticket_id, %holder_token, kind = e.kind(), error = %e, "Reservation faulted");
            }
        }

        outcome
    }

    /// An in-flight claim may still land after the caller stopped waiting for it
    /// (cancelled, timed-out round-trip). Release it by token in the background;
    /// a no-op if nothing was written.
    fn abandon_claim(&self, lock_key: &str, holder_token: &str) {
        let handle = LockHandle::new(
            lock_key,
            holder_token.to_string(),
            Instant::now(),
            self.policy.lease_timeout,
        );
        drop(LockGuard::new(Arc::clone(&self.coordinator), handle));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "transition panicked".to_string()
    }
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
