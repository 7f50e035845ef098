//! Single-flight, time-boxed memoization of per-server fetches.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::ConnectorError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, ConnectorError>>>;

struct Entry<T> {
    started_at: Instant,
    fetch: SharedFetch<T>,
}

/// Shared result cache in front of one physical server's "fetch everything"
/// call.
///
/// Many logical connectors hosted on the same server share one cache, keyed
/// by normalized server address. Within a window of `window` after a fetch
/// started, every caller for that address receives the same in-flight or
/// completed result; only once the window has elapsed does the next caller
/// start a fresh fetch. Entries are created lazily and never evicted.
///
/// A failed shared fetch is delivered to every caller of its window; the
/// next window retries unconditionally.
pub struct FeedCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> FeedCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct server addresses seen so far.
    pub fn tracked_servers(&self) -> usize {
        self.entries.lock().len()
    }
}

impl<T> FeedCache<T>
where
    T: Send + Sync + 'static,
{
    /// Return the shared result for `address`, starting exactly one new
    /// fetch if none started within the last `window`.
    ///
    /// The check-and-insert is atomic with respect to concurrent callers
    /// for the same address, so at most one underlying fetch runs per
    /// window. The fetch itself runs outside the lock; concurrent callers
    /// await the same shared operation.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        address: &str,
        window: Duration,
        fetch: F,
    ) -> Result<Arc<T>, ConnectorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>> + Send + 'static,
    {
        let key = normalize_address(address);
        let shared = {
            let mut entries = self.entries.lock();
            let reusable = entries
                .get(&key)
                .filter(|entry| entry.started_at.elapsed() <= window)
                .map(|entry| entry.fetch.clone());
            match reusable {
                Some(fetch) => {
                    debug!(server = %key, "reusing in-window fetch");
                    fetch
                }
                None => {
                    debug!(server = %key, "starting shared fetch");
                    let fut = fetch();
                    let shared: SharedFetch<T> =
                        async move { fut.await.map(Arc::new) }.boxed().shared();
                    entries.insert(
                        key,
                        Entry {
                            started_at: Instant::now(),
                            fetch: shared.clone(),
                        },
                    );
                    shared
                }
            }
        };

        shared.await
    }
}

impl<T> Default for FeedCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FeedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedCache")
            .field("tracked_servers", &self.tracked_servers())
            .finish()
    }
}

/// Normalize a server address for cache keying: trailing slashes are
/// trimmed, nothing else.
pub fn normalize_address(address: &str) -> String {
    address.trim_end_matches('/').to_string()
}
