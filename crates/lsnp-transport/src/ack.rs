use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use lsnp_core::wire::{ACK_MAX_RETRIES, ACK_SWEEP_INTERVAL, ACK_TIMEOUT};

/// Replaces the closure-over-dict resend registration of the original
/// implementation: each sender (file transfer, game engine, DM path) builds
/// a small struct implementing this trait that knows how to rebuild and
/// resend its own exact frame.
#[async_trait::async_trait]
pub trait ResendHandler: Send + Sync {
    async fn resend(&self);
}

struct Pending {
    retries: u32,
    next_due: Instant,
    handler: Arc<dyn ResendHandler>,
}

/// Tracks outstanding MESSAGE_IDs awaiting an ACK and drives their retry
/// schedule: resend every `ACK_TIMEOUT`, up to `ACK_MAX_RETRIES` attempts,
/// then give up silently (besides a warning log).
pub struct AckManager {
    pending: Mutex<HashMap<String, Pending>>,
}

impl AckManager {
    pub fn new() -> Arc<Self> {
        Arc::new(AckManager {
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn track(&self, message_id: impl Into<String>, handler: Arc<dyn ResendHandler>) {
        self.pending.lock().insert(
            message_id.into(),
            Pending {
                retries: 0,
                next_due: Instant::now() + ACK_TIMEOUT,
                handler,
            },
        );
    }

    pub fn acked(&self, message_id: &str) {
        self.pending.lock().remove(message_id);
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.pending.lock().contains_key(message_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Spawn the sweep task. The returned handle can be aborted on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ACK_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                this.sweep_once().await;
            }
        })
    }

    async fn sweep_once(&self) {
        let now = Instant::now();
        let due: Vec<(String, Arc<dyn ResendHandler>)> = {
            let mut pending = self.pending.lock();
            let mut due = Vec::new();
            let mut failed = Vec::new();
            for (mid, st) in pending.iter_mut() {
                if now < st.next_due {
                    continue;
                }
                if st.retries >= ACK_MAX_RETRIES {
                    failed.push(mid.clone());
                    continue;
                }
                st.retries += 1;
                st.next_due = now + ACK_TIMEOUT;
                due.push((mid.clone(), st.handler.clone()));
            }
            for mid in failed {
                pending.remove(&mid);
                warn!(message_id = %mid, "ACK failed after retries");
            }
            due
        };
        for (mid, handler) in due {
            info!(message_id = %mid, "retrying unacked message");
            handler.resend().await;
        }
    }
}

impl Default for AckManager {
    fn default() -> Self {
        AckManager {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ResendHandler for CountingHandler {
        async fn resend(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn track_then_ack_removes_pending() {
        let mgr = AckManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        mgr.track("m1", Arc::new(CountingHandler(count)));
        assert!(mgr.is_pending("m1"));
        mgr.acked("m1");
        assert!(!mgr.is_pending("m1"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_resends_until_retry_cap_then_drops() {
        let mgr = AckManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        mgr.track("m1", Arc::new(CountingHandler(count.clone())));

        for _ in 0..(ACK_MAX_RETRIES + 1) {
            tokio::time::advance(ACK_TIMEOUT + std::time::Duration::from_millis(1)).await;
            mgr.sweep_once().await;
        }

        assert_eq!(count.load(Ordering::SeqCst), ACK_MAX_RETRIES as usize);
        assert!(!mgr.is_pending("m1"));
    }
}
