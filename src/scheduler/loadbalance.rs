//! Worker selection strategies.
//!
//! Plain free functions over a slice of candidates, no trait object
//! indirection, covering the two strategies a caller can configure.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::LoadBalancing;
use crate::error::{Error, Result};

/// Picks the next worker index out of `0..worker_count` under `strategy`.
/// `rr_counter` is a scheduler-owned counter shared across calls (round
/// robin needs it to advance monotonically); `pending_counts[i]` is worker
/// `i`'s current in-flight invocation count (least-busy reads it, round
/// robin ignores it). Skips any index present in `unavailable`.
pub(crate) fn choose(
    strategy: LoadBalancing,
    worker_count: usize,
    rr_counter: &AtomicUsize,
    pending_counts: &[std::sync::Arc<AtomicUsize>],
    unavailable: &[bool],
) -> Result<usize> {
    if worker_count == 0 || unavailable.iter().all(|&u| u) {
        return Err(Error::invalid_state("no workers available"));
    }

    match strategy {
        LoadBalancing::RoundRobin => {
            for _ in 0..worker_count {
                let idx = rr_counter.fetch_add(1, Ordering::Relaxed) % worker_count;
                if !unavailable[idx] {
                    return Ok(idx);
                }
            }
            Err(Error::invalid_state("no workers available"))
        }
        LoadBalancing::LeastBusy => (0..worker_count)
            .filter(|&i| !unavailable[i])
            .min_by_key(|&i| pending_counts[i].load(Ordering::Relaxed))
            .ok_or_else(|| Error::invalid_state("no workers available")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn round_robin_cycles() {
        let rr = AtomicUsize::new(0);
        let counts: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let unavailable = vec![false; 3];
        let picks: Vec<_> = (0..6).map(|_| choose(LoadBalancing::RoundRobin, 3, &rr, &counts, &unavailable).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn round_robin_skips_unavailable() {
        let rr = AtomicUsize::new(0);
        let counts: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let unavailable = vec![false, true, false];
        let picks: Vec<_> = (0..4).map(|_| choose(LoadBalancing::RoundRobin, 3, &rr, &counts, &unavailable).unwrap()).collect();
        assert!(picks.iter().all(|&p| p != 1));
    }

    #[test]
    fn least_busy_picks_minimum() {
        let rr = AtomicUsize::new(0);
        let counts = vec![Arc::new(AtomicUsize::new(5)), Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(2))];
        let unavailable = vec![false; 3];
        assert_eq!(choose(LoadBalancing::LeastBusy, 3, &rr, &counts, &unavailable).unwrap(), 1);
    }

    #[test]
    fn no_workers_available_errors() {
        let rr = AtomicUsize::new(0);
        let counts: Vec<_> = (0..2).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let unavailable = vec![true, true];
        assert!(choose(LoadBalancing::LeastBusy, 2, &rr, &counts, &unavailable).is_err());
    }
}
