//! Per-username async locks.
//!
//! Serializes the read-assemble-generate-write sequence for one username so
//! concurrent requests from the same user cannot interleave their histories.
//! Different usernames never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `username`'s conversation.
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn acquire(&self, username: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            map.retain(|name, lock| name == username || Arc::strong_count(lock) > 1);
            Arc::clone(
                map.entry(username.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of usernames currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
