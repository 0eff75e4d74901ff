//! Notification bus: how the orchestrator tells presentation code what
//! happened.
//!
//! Subscribers are called in subscription order, synchronously, on the
//! task that emitted. Handlers may subscribe or unsubscribe (themselves or
//! others) while being called. A subscriber removed during a dispatch is
//! not called for the rest of that dispatch, and the others keep their
//! order.
//!
//! For async consumers, [`NotificationBus::subscribe_channel`] returns an
//! unbounded receiver instead of taking a callback. Channel subscriptions
//! go away on their own once the receiver is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::Status;

/// Something presentation code may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new status line to show.
    StateChanged(String),
    /// A match is ready: a client joined, or a host got its first player.
    MatchFound,
}

impl From<Status> for Notification {
    fn from(status: Status) -> Self {
        Self::StateChanged(status.message().to_string())
    }
}

/// Handle returned by subscribe calls, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Callback(Handler),
    Channel(mpsc::UnboundedSender<Notification>),
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

/// Ordered list of notification subscribers. Clone to share.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<Mutex<BusInner>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. It runs after every subscriber registered
    /// before it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(handler)))
    }

    /// Registers a channel subscriber.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add(Subscriber::Channel(tx)), rx)
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Delivers `notification` to every current subscriber, in order.
    pub fn emit(&self, notification: impl Into<Notification>) {
        let notification = notification.into();
        tracing::debug!(?notification, "notify");

        // Dispatch from a snapshot so handlers can change the list.
        let snapshot: Vec<(SubscriptionId, Subscriber)> = self.lock().subscribers.clone();
        let mut closed = Vec::new();

        for (id, subscriber) in snapshot {
            if !self.is_subscribed(id) {
                continue;
            }
            match subscriber {
                Subscriber::Callback(handler) => handler(&notification),
                Subscriber::Channel(tx) => {
                    if tx.send(notification.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }

        for id in closed {
            self.unsubscribe(id);
        }
    }

    fn add(&self, subscriber: Subscriber) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push((id, subscriber));
        id
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.iter().any(|(sid, _)| *sid == id)
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        // A panicking handler never runs under this lock.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
