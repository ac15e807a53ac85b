//! Observable Channels
//!
//! A [`Multicast`] is an observer list. Every attached observer owns an
//! unbounded queue, so a slow observer never causes another observer to miss
//! a value and never blocks the publisher.
//!
//! # Ordering
//!
//! `publish` holds the observer-list lock while it enqueues a value for every
//! observer. Two concurrent publishes therefore reach all observers in the
//! same relative order.
//!
//! # Replay
//!
//! The channel itself retains nothing. The state stream gets its
//! "replay latest" behaviour from [`Multicast::subscribe_with`]: the caller
//! seeds the new observer with the current value while holding whatever lock
//! orders its own publishes (see the reduction serializer).
//!
//! # Unsubscription
//!
//! Dropping a [`Subscription`] detaches it. The dead queue is pruned the next
//! time the list is touched.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::observer::ObserverId;

struct Observers<T> {
    list: Vec<(ObserverId, mpsc::UnboundedSender<T>)>,
    closed: bool,
}

/// A multicast observer list.
pub(crate) struct Multicast<T> {
    observers: Mutex<Observers<T>>,
}

impl<T> Multicast<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty, open channel.
    pub(crate) fn new() -> Self {
        Self {
            observers: Mutex::new(Observers {
                list: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Attach an observer that only sees values published from now on.
    pub(crate) fn subscribe(&self) -> Subscription<T> {
        self.attach(None)
    }

    /// Attach an observer whose first value is `initial`.
    ///
    /// On a closed channel the observer receives `initial` and then ends.
    pub(crate) fn subscribe_with(&self, initial: T) -> Subscription<T> {
        self.attach(Some(initial))
    }

    fn attach(&self, initial: Option<T>) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ObserverId::new();

        let mut observers = self.observers.lock();
        if let Some(value) = initial {
            // The receiver is alive; this cannot fail.
            let _ = tx.send(value);
        }
        if !observers.closed {
            observers.list.push((id, tx));
        }

        Subscription { id, rx }
    }

    /// Deliver `value` to every attached observer.
    ///
    /// Returns the number of observers that received it. Publishing with no
    /// observers attached discards the value.
    pub(crate) fn publish(&self, value: T) -> usize {
        let mut observers = self.observers.lock();
        if observers.closed {
            return 0;
        }
        observers
            .list
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
        observers.list.len()
    }

    /// Detach every observer and refuse new ones. Attached observers drain
    /// what they already received and then end.
    pub(crate) fn close(&self) {
        let mut observers = self.observers.lock();
        observers.closed = true;
        observers.list.clear();
    }

    /// Number of live observers.
    pub(crate) fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.list.retain(|(_, tx)| !tx.is_closed());
        observers.list.len()
    }
}

/// One observer's view of a multicast channel.
///
/// Values arrive in publish order. The subscription ends (`None`) once the
/// container is closed and everything already delivered has been read.
pub struct Subscription<T> {
    id: ObserverId,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// This observer's ID.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next value.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Detach from the channel. Other observers are unaffected.
    pub fn unsubscribe(self) {}

    /// Erase the subscription into a boxed stream.
    pub fn boxed(self) -> BoxStream<'static, T>
    where
        T: Send + 'static,
    {
        StreamExt::boxed(self)
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_observers_is_dropped() {
        let channel = Multicast::new();
        assert_eq!(channel.publish(1), 0);

        let mut late = channel.subscribe();
        assert_eq!(late.try_recv(), None);

        channel.publish(2);
        assert_eq!(late.try_recv(), Some(2));
    }

    #[test]
    fn every_observer_gets_every_value() {
        let channel = Multicast::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        assert_eq!(channel.publish("x"), 2);
        assert_eq!(channel.publish("y"), 2);

        assert_eq!(a.try_recv(), Some("x"));
        assert_eq!(a.try_recv(), Some("y"));
        assert_eq!(b.try_recv(), Some("x"));
        assert_eq!(b.try_recv(), Some("y"));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn seeded_subscription_starts_with_initial_value() {
        let channel = Multicast::new();
        let mut sub = channel.subscribe_with(10);
        channel.publish(11);

        assert_eq!(sub.try_recv(), Some(10));
        assert_eq!(sub.try_recv(), Some(11));
    }

    #[test]
    fn dropped_observer_is_pruned() {
        let channel = Multicast::new();
        let keep = channel.subscribe();
        let gone = channel.subscribe();
        assert_eq!(channel.observer_count(), 2);

        gone.unsubscribe();
        assert_eq!(channel.observer_count(), 1);
        assert_eq!(channel.publish(5), 1);
        drop(keep);
        assert_eq!(channel.publish(6), 0);
    }

    #[tokio::test]
    async fn close_ends_subscriptions_after_draining() {
        let channel = Multicast::new();
        let mut sub = channel.subscribe();
        channel.publish(1);
        channel.close();

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);

        let mut after = channel.subscribe_with(9);
        assert_eq!(after.recv().await, Some(9));
        assert_eq!(after.recv().await, None);
        assert_eq!(channel.publish(2), 0);
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let channel = Multicast::new();
        let sub = channel.subscribe_with(0);
        channel.publish(1);
        channel.publish(2);
        channel.close();

        let values: Vec<i32> = sub.boxed().collect().await;
        assert_eq!(values, vec![0, 1, 2]);
    }
}
