//! Heartbeat ticker driving unresponsive-worker detection: a worker that
//! misses `max_missed_heartbeats` consecutive heartbeats is replaced and its
//! pending invocations fail.
//!
//! Holds only a `Weak` reference to the scheduler so the monitor task itself
//! never keeps the scheduler alive — `Scheduler::drop`/`shutdown` simply lets
//! this task's next tick find nothing to upgrade and exit.

use std::sync::Weak;
use std::time::Duration;

use super::Scheduler;

pub(crate) fn spawn_monitor(scheduler: Weak<Scheduler>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            match scheduler.upgrade() {
                Some(s) => s.check_health(),
                None => break,
            }
        }
    })
}
