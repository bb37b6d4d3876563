//! Delivery of welcome events to the player.
//!
//! Sources hand out [`Subscription`]s; dropping one (or calling
//! [`Subscription::unsubscribe`]) detaches it from the source. Events are
//! queued per subscriber in arrival order and never dropped while the
//! subscription is alive.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::slide::WelcomeEvent;

pub trait EventSource: Send + Sync {
    fn subscribe(&self) -> Subscription;
}

type Detach = Box<dyn FnOnce() + Send>;

pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<WelcomeEvent>,
    detach: Option<Detach>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<WelcomeEvent>, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            receiver,
            detach: Some(Box::new(detach)),
        }
    }

    /// Next event, or `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<WelcomeEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WelcomeEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<WelcomeEvent>)>,
}

/// In-process fan-out of welcome events, FIFO per subscriber.
#[derive(Clone, Default)]
pub struct WelcomeBus {
    inner: Arc<Mutex<BusInner>>,
}

impl WelcomeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every live subscriber and returns how many got it.
    pub fn publish(&self, event: WelcomeEvent) -> usize {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (_, tx) in &inner.subscribers {
            // Closed between retain and send: the subscriber is gone anyway.
            let _ = tx.send(event.clone());
        }
        debug!(
            "Published welcome for {} to {} subscribers",
            event.visitor_id,
            inner.subscribers.len()
        );
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|(_, tx)| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl EventSource for WelcomeBus {
    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_id += 1;
            let id = inner.next_id;
            inner.subscribers.push((id, tx));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).subscribers.retain(|(sub, _)| *sub != id);
            }
        })
    }
}

fn lock(inner: &Mutex<BusInner>) -> std::sync::MutexGuard<'_, BusInner> {
    // A panic while holding the lock cannot leave the subscriber list
    // half-updated, so poisoning is ignored.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads one JSON `WelcomeEvent` per line and publishes it on `bus` until
/// EOF. Blank and malformed lines are skipped; missing visitor fields fall
/// back to placeholders. Returns the number of events published.
pub async fn read_json_lines<R>(reader: R, bus: WelcomeBus) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WelcomeEvent>(line) {
            Ok(event) => {
                bus.publish(event);
                published += 1;
            }
            Err(e) => warn!("Skipping malformed welcome event: {}", e),
        }
    }

    Ok(published)
}
