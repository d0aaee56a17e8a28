//! Single-flight coordination for renders of one uncached key.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// Renders currently populating the store, keyed by artifact path.
#[derive(Clone, Default)]
pub struct InFlightRenders {
    renders: Arc<DashMap<String, watch::Receiver<()>>>,
}

/// Role a caller plays for one key.
pub enum Flight {
    /// This caller renders; dropping the guard releases waiting followers.
    Leader(RenderGuard),
    /// Another caller is rendering the key.
    Follower(RenderWaiter),
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, key: &str) -> Flight {
        match self.renders.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                let (done, waiters) = watch::channel(());
                vacant.insert(waiters);
                Flight::Leader(RenderGuard {
                    key: key.to_string(),
                    renders: Arc::clone(&self.renders),
                    _done: done,
                })
            }
            Entry::Occupied(occupied) => Flight::Follower(RenderWaiter {
                done: occupied.get().clone(),
            }),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.renders.len()
    }
}

pub struct RenderGuard {
    key: String,
    renders: Arc<DashMap<String, watch::Receiver<()>>>,
    _done: watch::Sender<()>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.renders.remove(&self.key);
    }
}

pub struct RenderWaiter {
    done: watch::Receiver<()>,
}

impl RenderWaiter {
    /// Wait until the leader finishes. Returns false when `limit` elapsed first.
    pub async fn wait(mut self, limit: Duration) -> bool {
        // The leader never sends; completion is observed as the sender closing.
        tokio::time::timeout(limit, async {
            while self.done.changed().await.is_ok() {}
        })
        .await
        .is_ok()
    }
}
