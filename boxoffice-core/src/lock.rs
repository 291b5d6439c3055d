use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::models::TicketId;

/// Proof of one successful acquisition. Owned by exactly one reservation attempt.
#[derive(Debug)]
pub struct LockHandle {
    key: String,
    token: String,
    lease_deadline: Instant,
}

impl LockHandle {
    /// `attempted_at` is taken before the acquire round-trip, so the local deadline
    /// never outlives the coordinator's.
    pub fn new(key: &str, token: String, attempted_at: Instant, lease: Duration) -> Self {
        Self {
            key: key.to_string(),
            token,
            lease_deadline: attempted_at + lease,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn lease_deadline(&self) -> Instant {
        self.lease_deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.lease_deadline
    }
}

/// A holder token unique to one acquisition attempt: `<pid>:<uuid>`.
pub fn holder_token() -> String {
    format!("{}:{}", std::process::id(), Uuid::new_v4().simple())
}

/// Polling schedule for a contended key: exponential from `initial`, capped at `max`,
/// with jitter so waiters released by the same unlock don't stampede.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        let ceiling = self.initial.saturating_mul(factor).min(self.max);
        let floor = ceiling / 2;
        if ceiling <= floor {
            return ceiling;
        }
        rand::thread_rng().gen_range(floor..=ceiling)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(500))
    }
}

/// How long a reservation may queue for a ticket's lock, and how long it may hold it.
///
/// `lease_timeout` must exceed the worst-case transition time, otherwise the lock can
/// lapse mid-transition and admit a second writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    pub wait_timeout: Duration,
    pub lease_timeout: Duration,
    pub key_prefix: String,
}

impl LockPolicy {
    pub fn new(wait_timeout: Duration, lease_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            lease_timeout,
            key_prefix: "lock:".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    pub fn lock_key(&self, ticket_id: &TicketId) -> String {
        format!("{}{}", self.key_prefix, ticket_id)
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(3))
    }
}

/// Client side of an external lock service offering set-if-absent-with-expiry and
/// compare-and-delete.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Claim `key` for `token` unless a live claim exists. Never blocks on contention.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool, CoordinatorError>;

    /// Drop the claim if it still belongs to `handle`. `Ok(false)` means the lease had
    /// already lapsed (and possibly been reclaimed), which is not an error.
    async fn release(&self, handle: &LockHandle) -> Result<bool, CoordinatorError>;

    fn backoff(&self) -> Backoff {
        Backoff::default()
    }

    /// Poll `try_acquire` for `token` until it succeeds or `wait_timeout` elapses
    /// (`Ok(None)`). The caller owns the token, so it can still clean up a claim
    /// that landed after an error or cancellation.
    async fn acquire(
        &self,
        key: &str,
        token: &str,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<Option<LockHandle>, CoordinatorError> {
        let deadline = Instant::now() + wait_timeout;
        let backoff = self.backoff();
        let mut attempt: u32 = 0;

        loop {
            let attempted_at = Instant::now();
            if self.try_acquire(key, token, lease_timeout).await? {
                debug!(lock_key = %key, holder_token = %token, attempts = attempt + 1, "Lock acquired");
                return Ok(Some(LockHandle::new(key, token.to_string(), attempted_at, lease_timeout)));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(lock_key = %key, attempts = attempt + 1, "Lock wait timed out");
                return Ok(None);
            }

            tokio::time::sleep(backoff.delay(attempt).min(deadline - now)).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

#[derive(Debug)]
struct Lease {
    token: String,
    deadline: Instant,
}

/// Process-local coordinator with the same lease semantics as the Redis one.
/// Only serializes callers that share this instance.
#[derive(Debug, Default)]
pub struct InMemoryLockCoordinator {
    leases: Mutex<HashMap<String, Lease>>,
    backoff: Backoff,
}

impl InMemoryLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(backoff: Backoff) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            backoff,
        }
    }

    /// Token of the live holder of `key`, if any.
    pub async fn holder(&self, key: &str) -> Option<String> {
        let leases = self.leases.lock().await;
        leases
            .get(key)
            .filter(|lease| lease.deadline > Instant::now())
            .map(|lease| lease.token.clone())
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool, CoordinatorError> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();

        if let Some(current) = leases.get(key) {
            if current.deadline > now {
                return Ok(false);
            }
        }

        leases.insert(
            key.to_string(),
            Lease {
                token: token.to_string(),
                deadline: now + lease,
            },
        );
        Ok(true)
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, CoordinatorError> {
        let mut leases = self.leases.lock().await;

        let owned = matches!(leases.get(handle.key()), Some(lease) if lease.token == handle.token());
        if !owned {
            return Ok(false);
        }

        let live = leases
            .remove(handle.key())
            .map(|lease| lease.deadline > Instant::now())
            .unwrap_or(false);
        Ok(live)
    }

    fn backoff(&self) -> Backoff {
        self.backoff
    }
}

/// Scoped ownership of a held lock. Call [`LockGuard::release`] on the normal path;
/// if the guard is dropped instead (cancelled future, panic) release is spawned onto
/// the current runtime.
pub struct LockGuard {
    coordinator: Arc<dyn LockCoordinator>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    pub fn new(coordinator: Arc<dyn LockCoordinator>, handle: LockHandle) -> Self {
        Self {
            coordinator,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    pub async fn release(mut self) -> Result<bool, CoordinatorError> {
        match self.handle.take() {
            Some(handle) => self.coordinator.release(&handle).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let coordinator = Arc::clone(&self.coordinator);
                runtime.spawn(async move {
                    match coordinator.release(&handle).await {
                        Ok(released) => {
                            debug!(lock_key = %handle.key(), holder_token = %handle.token(), released, "Lock released after early exit")
                        }
                        Err(e) => {
                            warn!(lock_key = %handle.key(), holder_token = %handle.token(), error = %e, "Deferred lock release failed; lease will expire")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(lock_key = %handle.key(), holder_token = %handle.token(), "No runtime to release lock; lease will expire");
            }
        }
    }
}
