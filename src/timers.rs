//! Four independent one-shot deadline timers (`poll`, `resync`, `retry`, `statusUpdate`).
//!
//! Deliberately *not* `tokio::time::interval` tickers: a one-shot timer that the
//! driver explicitly re-arms after handling its firing means a pass whose
//! duration exceeds the timer period never leaves a queue of stale firings
//! behind — the same reasoning `kube-runtime`'s `Scheduler`/`DelayQueue` is
//! built around, generalized here
//! to four independently-armed single slots instead of one dedup'd multi-key
//! queue, since each of our triggers is its own named timer rather than an
//! arbitrary keyed message.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

struct OneShot {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl OneShot {
    fn new(period: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep(period)),
            armed: true,
        }
    }

    fn reset(&mut self, period: Duration) {
        self.sleep.as_mut().reset(Instant::now() + period);
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

/// Owns the four timers the driver selects over. `resync`/`poll` are always
/// re-armed on their own firing; `retry`/`statusUpdate` are re-armed only when
/// the pass they triggered actually did something.
pub struct Timers {
    resync: OneShot,
    poll: OneShot,
    retry: OneShot,
    status_update: OneShot,
}

impl Timers {
    pub fn new(poll_period: Duration, resync_period: Duration, retry_period: Duration, status_update_period: Duration) -> Self {
        Self {
            resync: OneShot::new(resync_period),
            poll: OneShot::new(poll_period),
            retry: OneShot::new(retry_period),
            status_update: OneShot::new(status_update_period),
        }
    }

    pub fn reset_resync(&mut self, period: Duration) {
        self.resync.reset(period);
    }

    pub fn reset_poll(&mut self, period: Duration) {
        self.poll.reset(period);
    }

    pub fn reset_retry(&mut self, period: Duration) {
        self.retry.reset(period);
    }

    pub fn reset_status_update(&mut self, period: Duration) {
        self.status_update.reset(period);
    }

    pub fn disarm_retry(&mut self) {
        self.retry.disarm();
    }

    pub fn disarm_status_update(&mut self) {
        self.status_update.disarm();
    }

    /// Wait for whichever armed timer fires first, returning which one.
    ///
    /// `tokio::select!`'s `biased;` mode gives us the required trigger priority
    /// order without an extra layer of bookkeeping: `resync` outranks
    /// `reimport`/`retry`/`statusUpdate` among the timer-driven triggers, so
    /// it is polled first whenever more than one timer is ready.
    pub async fn next_fired(&mut self) -> TimerKind {
        tokio::select! {
            biased;
            _ = &mut self.resync.sleep, if self.resync.armed => TimerKind::Resync,
            _ = &mut self.poll.sleep, if self.poll.armed => TimerKind::Poll,
            _ = &mut self.retry.sleep, if self.retry.armed => TimerKind::Retry,
            _ = &mut self.status_update.sleep, if self.status_update.armed => TimerKind::StatusUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Resync,
    Poll,
    Retry,
    StatusUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_in_priority_order_when_simultaneous() {
        // all four armed with the same deadline: resync must win, ties broken by
        // declaration order (resync, poll, retry, statusUpdate), matching the
        // trigger priority table.
        let mut timers = Timers::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(timers.next_fired().await, TimerKind::Resync);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_is_never_selected() {
        let mut timers = Timers::new(
            Duration::from_secs(100),
            Duration::from_secs(100),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );
        timers.disarm_retry();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(timers.next_fired().await, TimerKind::StatusUpdate);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rearms_with_a_fresh_deadline() {
        let mut timers = Timers::new(
            Duration::from_secs(100),
            Duration::from_secs(100),
            Duration::from_secs(1),
            Duration::from_secs(100),
        );
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(timers.next_fired().await, TimerKind::Retry);
        timers.reset_retry(Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(tokio::time::timeout(Duration::from_millis(10), timers.next_fired())
            .await
            .is_err());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(timers.next_fired().await, TimerKind::Retry);
    }
}
