//! In-process typed publish/subscribe.
//!
//! A [`Bus<E>`] fans every published event out to all live subscribers. The
//! event type is a closed enum per use site, so there are no string topics to
//! mistype. Each subscriber gets its own unbounded queue; publishing never
//! blocks and never waits on a slow subscriber.
//!
//! ```text
//! publish(e) ──► [sub 1 queue] ──► Subscription::recv()
//!            └─► [sub 2 queue] ──► Subscription::recv()
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use ahash::AHashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct BusInner<E> {
    next_id: u64,
    subscribers: AHashMap<u64, UnboundedSender<E>>,
}

/// Typed event bus. Cloning yields another handle to the same bus.
pub struct Bus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Clone for Bus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Send + 'static> Default for Bus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> Bus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: AHashMap::new(),
            })),
        }
    }

    /// Register a new subscriber. Events published from now on are queued
    /// for it until it unsubscribes or is dropped.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        Subscription {
            id,
            rx,
            bus: self.clone(),
            active: true,
        }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.remove(&id).is_some()
    }

    /// Deliver `event` to every subscriber and return how many received it.
    ///
    /// Subscribers whose receiver has been dropped are pruned.
    pub fn publish(&self, event: E) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

/// Receiving half of a bus subscription.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription<E: Clone + Send + 'static> {
    id: u64,
    rx: UnboundedReceiver<E>,
    bus: Bus<E>,
    active: bool,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving new events. Calling this more than once is a no-op.
    pub fn unsubscribe(&mut self) {
        if self.active {
            self.active = false;
            self.bus.unsubscribe(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<E: Clone + Send + 'static> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        A(u32),
        B,
    }

    #[test]
    fn fan_out_to_all_subscribers() {
        let bus = Bus::new();
        let mut s1 = bus.subscribe();
        let mut s2 = bus.subscribe();
        assert_eq!(bus.publish(Ev::A(1)), 2);
        assert_eq!(s1.try_recv(), Some(Ev::A(1)));
        assert_eq!(s2.try_recv(), Some(Ev::A(1)));
        assert_eq!(s1.try_recv(), None);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus: Bus<Ev> = Bus::new();
        let mut s = bus.subscribe();
        s.unsubscribe();
        s.unsubscribe();
        assert!(!s.is_active());
        assert_eq!(bus.publish(Ev::B), 0);
        assert_eq!(s.try_recv(), None);
    }

    #[test]
    fn dropped_subscription_is_removed() {
        let bus: Bus<Ev> = Bus::new();
        {
            let _s = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
