//! Property tests for this crate's universal invariants, run against
//! randomized operation sequences rather than single fixed traces.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use gonex::lockfree::spsc::SpscQueue;
use gonex::{Channel, Mutex, Once, WaitGroup};
use proptest::prelude::*;

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    /// For every mutex M: at any instant at most one holder.
    #[test]
    fn mutex_mutual_exclusion(n_tasks in 2usize..8, n_rounds in 1usize..6) {
        rt().block_on(async move {
            let mutex = Arc::new(Mutex::new(0i64));
            let concurrent_holders = Arc::new(AtomicI64::new(0));
            let max_observed = Arc::new(AtomicI64::new(0));

            let local = tokio::task::LocalSet::new();
            local.run_until(async move {
                let mut handles = Vec::new();
                for _ in 0..n_tasks {
                    let mutex = mutex.clone();
                    let concurrent = concurrent_holders.clone();
                    let max_observed = max_observed.clone();
                    handles.push(tokio::task::spawn_local(async move {
                        for _ in 0..n_rounds {
                            let mut guard = mutex.lock(-1).await.unwrap();
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            max_observed.fetch_max(now, Ordering::SeqCst);
                            *guard += 1;
                            tokio::task::yield_now().await;
                            concurrent.fetch_sub(1, Ordering::SeqCst);
                        }
                    }));
                }
                for h in handles {
                    h.await.unwrap();
                }
            }).await;

            assert!(max_observed.load(Ordering::SeqCst) <= 1);
            assert_eq!(*mutex.lock(-1).await.unwrap(), (n_tasks * n_rounds) as i64);
        });
    }

    /// For every channel C with capacity k: 0 <= len(C) <= k at all times.
    #[test]
    fn channel_capacity_bound(capacity in 1usize..8, sends in 1usize..20) {
        rt().block_on(async move {
            let chan: Arc<Channel<u32>> = Arc::new(Channel::new(capacity));
            let max_len = Arc::new(AtomicUsize::new(0));

            let local = tokio::task::LocalSet::new();
            let received = local.run_until(async move {
                let sender = {
                    let chan = chan.clone();
                    tokio::task::spawn_local(async move {
                        for i in 0..sends as u32 {
                            chan.send(i, -1).await.unwrap();
                        }
                        chan.close().unwrap();
                    })
                };
                let max_len_clone = max_len.clone();
                let receiver = {
                    let chan = chan.clone();
                    tokio::task::spawn_local(async move {
                        let mut received = 0usize;
                        loop {
                            max_len_clone.fetch_max(chan.len(), Ordering::SeqCst);
                            match chan.receive(-1).await.unwrap() {
                                Some(_) => received += 1,
                                None => break,
                            }
                        }
                        received
                    })
                };
                sender.await.unwrap();
                receiver.await.unwrap()
            }).await;

            assert_eq!(received, sends);
            assert!(max_len.load(Ordering::SeqCst) <= capacity);
        });
    }

    /// For SPSC queue of capacity n: enqueue succeeds iff size < n; dequeue
    /// succeeds iff size > 0; interleaved operations preserve FIFO order.
    #[test]
    fn spsc_preserves_order_and_capacity(capacity in 1usize..16, ops in prop::collection::vec(any::<bool>(), 1..100)) {
        let queue: SpscQueue<u64> = SpscQueue::new(capacity);
        let mut model = std::collections::VecDeque::new();
        let mut next_value = 0u64;

        for enqueue in ops {
            if enqueue {
                let would_fit = model.len() < capacity;
                let result = queue.enqueue(next_value);
                prop_assert_eq!(result.is_ok(), would_fit);
                if result.is_ok() {
                    model.push_back(next_value);
                }
                next_value += 1;
            } else {
                let expected = model.pop_front();
                prop_assert_eq!(queue.dequeue(), expected);
            }
        }
    }

    /// WaitGroup counter never reads negative.
    #[test]
    fn waitgroup_counter_never_negative(deltas in prop::collection::vec(-5i64..5, 1..40)) {
        let wg = WaitGroup::new();
        let mut model = 0i64;
        for d in deltas {
            let would_go_negative = model + d < 0;
            let result = wg.add(d);
            prop_assert_eq!(result.is_err(), would_go_negative);
            if result.is_ok() {
                model += d;
            }
            prop_assert_eq!(wg.count(), model);
            prop_assert!(wg.count() >= 0);
        }
    }

    /// Retry with maxAttempts = 1 is equivalent to a plain invocation.
    #[test]
    fn retry_with_one_attempt_is_plain_invocation(succeeds in any::<bool>()) {
        rt().block_on(async move {
            let opts = gonex::RetryOptions { max_attempts: 1, ..Default::default() };
            let result = gonex::go_with_retry(
                || async move {
                    if succeeds {
                        Ok::<_, gonex::Error>(1)
                    } else {
                        Err(gonex::Error::Timeout(std::time::Duration::from_millis(1)))
                    }
                },
                opts,
            )
            .await;
            assert_eq!(result.is_ok(), succeeds);
        });
    }
}

#[tokio::test]
async fn once_invoked_at_most_once_under_contention() {
    for _ in 0..20 {
        let once = Arc::new(Once::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut handles = Vec::new();
                for _ in 0..8 {
                    let once = once.clone();
                    let calls = calls.clone();
                    handles.push(tokio::task::spawn_local(async move {
                        once.call(|| {
                            let calls = calls.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }
                        })
                        .await
                    }));
                }
                for h in handles {
                    h.await.unwrap().unwrap();
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn context_value_inheritance_round_trip() {
    let bg = gonex::background();
    let with_k = gonex::with_value(&bg, "k", 42i32);
    assert_eq!(*with_k.value::<i32>("k").unwrap(), 42);
    let child = gonex::with_value(&with_k, "other", "x".to_string());
    assert_eq!(*child.value::<i32>("k").unwrap(), *with_k.value::<i32>("k").unwrap());
}
