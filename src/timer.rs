//! Ticker (periodic) and Timer (one-shot) events delivered through a channel.
//!
//! Both wrap a background `tokio::task` pushing onto a
//! [`crate::channel::Channel`]. `Ticker`'s drift policy — schedule from the
//! previous fire time, not wall clock — is `tokio::time::interval`'s native
//! behavior; its backlog policy (at most one pending tick, extras dropped
//! and counted) is implemented with a capacity-1 channel and a non-blocking
//! `try_send` from the ticker loop, counting drops in `dropped_ticks`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as RawMutex;

use crate::channel::{Channel, TrySendError};

/// Suspends the caller for `ms` milliseconds.
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Emits a monotonically increasing tick number on its channel at the
/// configured interval, until [`Ticker::stop`].
pub struct Ticker {
    chan: Arc<Channel<u64>>,
    tick_count: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    interval_ms: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    task: RawMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        let chan = Arc::new(Channel::new(1));
        let tick_count = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let interval_ms = Arc::new(AtomicU64::new(interval.as_millis() as u64));
        let running = Arc::new(AtomicBool::new(true));

        let task = {
            let chan = chan.clone();
            let tick_count = tick_count.clone();
            let dropped = dropped.clone();
            let interval_ms = interval_ms.clone();
            let running = running.clone();
            tokio::spawn(async move {
                let mut current = interval;
                let mut ivl = tokio::time::interval(current);
                while running.load(Ordering::Acquire) {
                    ivl.tick().await;
                    let n = tick_count.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Err(TrySendError::Full(_)) = chan.try_send(n) {
                        dropped.fetch_add(1, Ordering::SeqCst);
                    }
                    let requested = Duration::from_millis(interval_ms.load(Ordering::Relaxed));
                    if requested != current {
                        current = requested;
                        ivl = tokio::time::interval(current);
                    }
                }
            })
        };

        Ticker { chan, tick_count, dropped, interval_ms, running, task: RawMutex::new(Some(task)) }
    }

    /// The channel ticks are delivered on; `receive()` it in a loop.
    pub fn channel(&self) -> &Channel<u64> {
        &self.chan
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Changes the interval; takes effect starting from the next tick.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms.store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops emitting further ticks and closes the channel.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(handle) = self.task.lock().take() {
                handle.abort();
            }
            let _ = self.chan.close();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A one-shot timer; fires once on its channel after `duration`, or whenever
/// last reset by [`Timer::reset`].
pub struct Timer {
    chan: Arc<Channel<()>>,
    task: RawMutex<Option<tokio::task::JoinHandle<()>>>,
    fired: Arc<AtomicBool>,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        let chan = Arc::new(Channel::new(1));
        let fired = Arc::new(AtomicBool::new(false));
        let task = Self::spawn(chan.clone(), fired.clone(), duration);
        Timer { chan, task: RawMutex::new(Some(task)), fired }
    }

    fn spawn(chan: Arc<Channel<()>>, fired: Arc<AtomicBool>, duration: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            fired.store(true, Ordering::SeqCst);
            let _ = chan.try_send(());
        })
    }

    pub fn channel(&self) -> &Channel<()> {
        &self.chan
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Restarts the countdown from `duration`, cancelling any pending fire.
    pub fn reset(&self, duration: Duration) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.fired.store(false, Ordering::SeqCst);
        let _ = self.chan.try_receive();
        *self.task.lock() = Some(Self::spawn(self.chan.clone(), self.fired.clone(), duration));
    }

    /// Cancels the timer; it will not fire unless [`Timer::reset`] is called.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticker_emits_monotonic_ticks() {
        let ticker = Ticker::new(Duration::from_millis(10));
        for expected in 1..=3u64 {
            let tick = ticker.channel().receive(-1).await.unwrap().unwrap();
            assert_eq!(tick, expected);
        }
        ticker.stop();
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_coalesces_backlog() {
        let ticker = Ticker::new(Duration::from_millis(5));
        // Let several ticks fire without ever receiving.
        tokio::time::sleep(Duration::from_millis(55)).await;
        let _ = ticker.channel().receive(-1).await.unwrap();
        ticker.stop();
        assert!(ticker.dropped_ticks() > 0, "excess backlog ticks should be counted as dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once() {
        let timer = Timer::new(Duration::from_millis(10));
        let fired = timer.channel().receive(-1).await.unwrap();
        assert_eq!(fired, Some(()));
        assert!(timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reset_restarts_countdown() {
        let timer = Timer::new(Duration::from_millis(10));
        timer.reset(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!timer.has_fired(), "reset should have pushed the fire time out");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(timer.has_fired());
    }

    #[tokio::test]
    async fn sleep_resolves() {
        sleep(1).await;
    }
}
