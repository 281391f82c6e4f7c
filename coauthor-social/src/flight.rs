//! Keyed single-flight: coalesce concurrent fetches of one key into a
//! single execution whose result every caller shares.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use tokio::sync::broadcast;

/// Coalesces concurrent `run` calls per key. The first caller for a key
/// becomes the leader and executes the fetch; callers arriving while the
/// fetch is in flight wait for the leader's result instead of fetching
/// themselves.
///
/// Errors are shared as strings because the result is broadcast to every
/// waiter.
pub struct SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    inflight: DashMap<String, broadcast::Sender<Result<T, String>>>,
}

/// Removes the in-flight entry when the leader finishes or is cancelled,
/// so waiters never hang on an abandoned fetch.
struct InflightGuard<'a, T>
where
    T: Clone + Send + 'static,
{
    map: &'a DashMap<String, broadcast::Sender<Result<T, String>>>,
    key: String,
}

impl<T> Drop for InflightGuard<'_, T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty single-flight group.
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Run `fetch` for `key`, or wait for the in-flight fetch of the same
    /// key and share its result.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<T, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let tx = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                let mut rx = entry.get().subscribe();
                drop(entry);
                return match rx.recv().await {
                    Ok(result) => result,
                    // the leader was cancelled before producing a result
                    Err(_) => Err("in-flight lookup abandoned".to_string()),
                };
            }
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                tx
            }
        };

        let guard = InflightGuard {
            map: &self.inflight,
            key: key.to_string(),
        };
        let result = fetch().await;
        // deregister before broadcasting so late arrivals start fresh
        drop(guard);
        let _ = tx.send(result.clone());
        result
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let flight = Arc::new(SingleFlight::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("k", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(7u64)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequential_callers_fetch_again() {
        let flight = SingleFlight::<u64>::new();
        let calls = AtomicUsize::new(0);

        for expected in 1..=3 {
            let value = flight
                .run("k", || async {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) as u64 + 1)
                })
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight = Arc::new(SingleFlight::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for key in ["a", "b"] {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(1u64)
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_leader_error_is_shared() {
        let flight = Arc::new(SingleFlight::<u64>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err("source down".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let follower = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.run("k", || async { Ok(1u64) }).await })
        };

        assert_eq!(leader.await.unwrap().unwrap_err(), "source down");
        assert_eq!(follower.await.unwrap().unwrap_err(), "source down");
    }
}
