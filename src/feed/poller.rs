//! Background polling loop.
//!
//! One [`Poller`] runs per process. Each cycle reads the polling interval from
//! the store, clamps it to the configured minimum, runs one batch under a
//! deadline, then waits for the interval or a stop signal.
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::feed::fetcher::Fetcher;
use crate::storage::FeedStore;

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub min_interval_minutes: u32,
    pub batch_timeout: Duration,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval_minutes: config.min_polling_interval_minutes,
            batch_timeout: config.batch_timeout(),
        }
    }
}

/// Interval to wait between cycles, never shorter than `min_minutes`.
pub fn effective_interval(requested_minutes: u32, min_minutes: u32) -> Duration {
    Duration::from_secs(u64::from(requested_minutes.max(min_minutes)) * 60)
}

/// Handle to the running polling loop.
///
/// Dropping the handle leaves the loop running; call [`Poller::stop`] to end it.
pub struct Poller {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn start<S: FeedStore>(fetcher: Fetcher<S>, settings: PollerSettings) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(fetcher, settings, shutdown.clone()));
        tracing::info!(
            min_interval_minutes = settings.min_interval_minutes,
            "Poller started"
        );
        Self { shutdown, handle }
    }

    /// Signal the loop to stop and wait until it has exited.
    ///
    /// A batch in flight is cancelled and drained before this returns.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Poller task failed");
        }
        tracing::info!("Poller stopped");
    }
}

async fn run<S: FeedStore>(
    fetcher: Fetcher<S>,
    settings: PollerSettings,
    shutdown: CancellationToken,
) {
    loop {
        let requested = match fetcher.store().polling_interval_minutes().await {
            Ok(minutes) => minutes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read polling interval, using minimum");
                settings.min_interval_minutes
            }
        };
        let interval = effective_interval(requested, settings.min_interval_minutes);
        tracing::info!(
            interval_minutes = interval.as_secs() / 60,
            "Poller: fetching all feeds"
        );

        // Child token: stop() also cancels a running batch.
        let batch = shutdown.child_token();
        let refresh = fetcher.refresh_all(&batch);
        tokio::pin!(refresh);
        let result = tokio::select! {
            result = &mut refresh => result,
            _ = tokio::time::sleep(settings.batch_timeout) => {
                tracing::warn!(
                    timeout_secs = settings.batch_timeout.as_secs(),
                    "Poller: batch deadline reached, cancelling"
                );
                batch.cancel();
                refresh.await
            }
        };

        match result {
            Ok(outcome) => {
                if let Some(e) = &outcome.error {
                    tracing::warn!(error = %e, "Poller: batch incomplete");
                }
                tracing::info!(
                    new_items = outcome.total_new_items(),
                    feeds = outcome.new_items.len(),
                    failed = outcome.failed(),
                    "Poller: batch done"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Poller error"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
