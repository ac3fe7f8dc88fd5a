use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

/// A timer task that posts events into the supervisor's queue.
///
/// The inner [`CancellationToken`] is cancelled when the [`Timer`] is dropped, so disarming a
/// timer is simply dropping its handle. An event that was already queued before the drop is
/// still delivered; receivers check their own armed state before acting on it.
#[derive(Debug)]
pub(crate) struct Timer(CancellationToken);

impl Timer {
    /// Post `event` once after `delay`.
    pub(crate) fn once<E: Send + 'static>(
        delay: Duration,
        tx: mpsc::UnboundedSender<E>,
        event: E,
    ) -> Self {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token_clone.cancelled() => {}
                () = sleep(delay) => {
                    _ = tx.send(event);
                }
            }
        });

        Self(token)
    }

    /// Post `make_event()` every `period`, starting one `period` from now.
    pub(crate) fn every<E, F>(period: Duration, tx: mpsc::UnboundedSender<E>, make_event: F) -> Self
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token_clone.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(make_event()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self(token)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
