//! Expiration dispatch worker.
//!
//! One thread per TTL cache drains the delay queue and hands every fired key
//! back to the cache for revalidation. The thread only holds a weak reference
//! to the cache, so dropping the last cache handle is never blocked by it.

use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::delay_queue::DelayQueue;

/// Something that can revalidate a key whose wake-up fired.
pub(crate) trait ExpireTarget<K>: Send + Sync + 'static {
    fn on_due(&self, key: &K, due: i64);
}

/// Spawn the dispatch thread.
///
/// The thread exits when the queue is closed or the target has been dropped.
pub(crate) fn spawn_dispatcher<K, T>(
    target: Weak<T>,
    queue: Arc<DelayQueue<K>>,
) -> io::Result<JoinHandle<()>>
where
    K: Send + 'static,
    T: ExpireTarget<K>,
{
    thread::Builder::new()
        .name("ttl-dispatch".to_string())
        .spawn(move || {
            debug!("expiration dispatcher started");
            let mut fired: u64 = 0;
            while let Some((key, due)) = queue.dequeue() {
                let Some(target) = target.upgrade() else {
                    break;
                };
                target.on_due(&key, due);
                fired += 1;
            }
            debug!(fired, "expiration dispatcher stopped");
        })
}
