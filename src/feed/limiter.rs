//! Per-origin politeness limits.
//!
//! Every request to a feed first takes a slot from [`OriginLimiter`], which
//! enforces two limits per origin (host and port of the feed URL):
//!
//! - at most `per_origin` requests in flight at once
//! - consecutive dispatches at least `spacing` apart
//!
//! The origin map is guarded by a plain mutex that is only held for
//! bookkeeping. Waiting for a slot and sleeping out the spacing happen with the
//! lock released, so a slow origin never delays an unrelated one.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cancelled while waiting for an origin slot")]
pub struct AcquireCancelled;

struct OriginState {
    gate: Arc<Semaphore>,
    /// Latest dispatch time handed out, or the latest release if later
    last_request: Option<Instant>,
}

pub struct OriginLimiter {
    origins: Mutex<HashMap<String, OriginState>>,
    per_origin: usize,
    spacing: Duration,
}

impl OriginLimiter {
    pub fn new(per_origin: usize, spacing: Duration) -> Self {
        Self {
            origins: Mutex::new(HashMap::new()),
            per_origin: per_origin.max(1),
            spacing,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OriginState>> {
        // The map holds no invariants a panicking holder could break halfway.
        self.origins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a slot on `origin` and for the spacing interval to pass.
    ///
    /// The returned permit releases the slot when dropped. If `cancel` fires
    /// first, no slot is held on return.
    pub async fn acquire(
        self: &Arc<Self>,
        origin: &str,
        cancel: &CancellationToken,
    ) -> Result<OriginPermit, AcquireCancelled> {
        let gate = {
            let mut origins = self.lock();
            let state = origins
                .entry(origin.to_string())
                .or_insert_with(|| OriginState {
                    gate: Arc::new(Semaphore::new(self.per_origin)),
                    last_request: None,
                });
            Arc::clone(&state.gate)
        };

        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AcquireCancelled),
            slot = gate.acquire_owned() => slot.map_err(|_| AcquireCancelled)?,
        };

        // Reserve a dispatch time under the lock so concurrent holders of the
        // same origin are spaced from each other, not just from the last release.
        let (dispatch_at, previous) = {
            let mut origins = self.lock();
            let now = Instant::now();
            let previous = origins.get(origin).and_then(|s| s.last_request);
            let at = match previous {
                Some(last) => now.max(last + self.spacing),
                None => now,
            };
            if let Some(state) = origins.get_mut(origin) {
                state.last_request = Some(at);
            }
            (at, previous)
        };

        if dispatch_at > Instant::now() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.unreserve(origin, dispatch_at, previous);
                    drop(slot);
                    return Err(AcquireCancelled);
                }
                _ = tokio::time::sleep_until(dispatch_at) => {}
            }
        }

        Ok(OriginPermit {
            limiter: Arc::clone(self),
            origin: origin.to_string(),
            _slot: slot,
        })
    }

    /// Undo a reservation that never dispatched, unless a later reservation
    /// or release has already moved the timestamp on.
    fn unreserve(&self, origin: &str, reserved: Instant, previous: Option<Instant>) {
        let mut origins = self.lock();
        if let Some(state) = origins.get_mut(origin) {
            if state.last_request == Some(reserved) {
                state.last_request = previous;
            }
        }
    }

    fn release(&self, origin: &str) {
        let mut origins = self.lock();
        if let Some(state) = origins.get_mut(origin) {
            let now = Instant::now();
            state.last_request = Some(state.last_request.map_or(now, |last| last.max(now)));
        }
    }

    /// Requests currently holding a slot on `origin`.
    pub fn in_flight(&self, origin: &str) -> usize {
        self.lock()
            .get(origin)
            .map_or(0, |s| self.per_origin - s.gate.available_permits())
    }
}

/// A held origin slot. Dropping it records the release time and frees the slot.
pub struct OriginPermit {
    limiter: Arc<OriginLimiter>,
    origin: String,
    _slot: OwnedSemaphorePermit,
}

impl OriginPermit {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Drop for OriginPermit {
    fn drop(&mut self) {
        // Fields drop after this body, so the timestamp lands before the slot frees.
        self.limiter.release(&self.origin);
    }
}

/// Host (and explicit port) of a feed URL; the URL itself when it has none.
pub fn origin_of(feed_url: &str) -> String {
    match url::Url::parse(feed_url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => feed_url.to_string(),
        },
        Err(_) => feed_url.to_string(),
    }
}
