//! # pipelinectl-events
//!
//! In-process publish/subscribe event bus (C3, §4.3). One [`Bus<T>`]
//! instance models one channel (`deployments`, `pipelines`, `health`,
//! `alerts`, `compliance`); the payload type `T` *is* the channel's
//! well-typed event enum (§9's substitution for callbacks-as-control-flow).
//!
//! `publish` never blocks: it takes a lock just long enough to push into
//! each subscriber's bounded ring buffer. A subscriber that falls behind
//! has its oldest undelivered events dropped and receives a single
//! coalesced [`Delivery::Overflow`] in their place, per §4.3.
//!
//! # Example
//!
//! ```
//! use pipelinectl_events::{Bus, Delivery};
//!
//! let bus: Bus<&'static str> = Bus::new(4);
//! let mut sub = bus.subscribe();
//! bus.publish("hello");
//! assert!(matches!(sub.try_recv(), Some(Delivery::Event("hello"))));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default bounded buffer size per subscriber (§4.3).
pub const DEFAULT_CAPACITY: usize = 256;

/// What a subscriber receives from [`Subscription::try_recv`] /
/// [`Subscription::recv_timeout`]: either a real event, or notice that
/// some number of events were dropped for this subscriber before it could
/// be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    Event(T),
    Overflow { dropped: u64 },
}

struct SubscriberState<T> {
    queue: VecDeque<T>,
    capacity: usize,
    dropped_since_notice: u64,
    overflow_pending: bool,
}

struct Inner<T> {
    subscribers: HashMap<u64, SubscriberState<T>>,
    next_id: u64,
}

/// One pub/sub channel. Cheap to clone (`Arc` inside); typically held once
/// per channel behind the facade crate's `Deps` struct.
pub struct Bus<T> {
    inner: Arc<Mutex<Inner<T>>>,
    condvar: Arc<Condvar>,
    capacity: usize,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            condvar: self.condvar.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> Bus<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                subscribers: HashMap::new(),
                next_id: 0,
            })),
            condvar: Arc::new(Condvar::new()),
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Register a new subscriber. Its buffer starts empty: it only sees
    /// events published after this call, matching "lazy" delivery (§4.3).
    pub fn subscribe(&self) -> Subscription<T> {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(
            id,
            SubscriberState {
                queue: VecDeque::new(),
                capacity: self.capacity,
                dropped_since_notice: 0,
                overflow_pending: false,
            },
        );
        Subscription {
            inner: self.inner.clone(),
            condvar: self.condvar.clone(),
            id,
        }
    }

    /// Non-blocking publish: pushes into every current subscriber's
    /// buffer, dropping the oldest entry first when a buffer is full.
    pub fn publish(&self, event: T) {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        for sub in inner.subscribers.values_mut() {
            if sub.queue.len() >= sub.capacity {
                sub.queue.pop_front();
                sub.dropped_since_notice += 1;
                sub.overflow_pending = true;
            }
            sub.queue.push_back(event.clone());
        }
        drop(inner);
        self.condvar.notify_all();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("event bus mutex poisoned").subscribers.len()
    }
}

/// A restartable cursor over one subscriber's view of the bus. Dropping a
/// `Subscription` deregisters it; no further buffer growth happens on its
/// behalf.
pub struct Subscription<T> {
    inner: Arc<Mutex<Inner<T>>>,
    condvar: Arc<Condvar>,
    id: u64,
}

impl<T> Subscription<T> {
    /// Pull the next delivery if one is already buffered, without blocking.
    pub fn try_recv(&mut self) -> Option<Delivery<T>> {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        Self::pop_locked(&mut inner, self.id)
    }

    /// Block up to `timeout` for the next delivery.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Delivery<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        loop {
            if let Some(d) = Self::pop_locked(&mut inner, self.id) {
                return Some(d);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(inner, deadline - now)
                .expect("event bus mutex poisoned");
            inner = guard;
            if result.timed_out() {
                return Self::pop_locked(&mut inner, self.id);
            }
        }
    }

    fn pop_locked(inner: &mut Inner<T>, id: u64) -> Option<Delivery<T>> {
        let sub = inner.subscribers.get_mut(&id)?;
        if sub.overflow_pending {
            sub.overflow_pending = false;
            let dropped = sub.dropped_since_notice;
            sub.dropped_since_notice = 0;
            return Some(Delivery::Overflow { dropped });
        }
        sub.queue.pop_front().map(Delivery::Event)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_delivered_fifo() {
        let bus: Bus<u32> = Bus::new(8);
        let mut sub = bus.subscribe();
        bus.publish(1);
        bus.publish(2);
        bus.publish(3);
        assert_eq!(sub.try_recv(), Some(Delivery::Event(1)));
        assert_eq!(sub.try_recv(), Some(Delivery::Event(2)));
        assert_eq!(sub.try_recv(), Some(Delivery::Event(3)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn late_subscriber_does_not_see_earlier_events() {
        let bus: Bus<u32> = Bus::new(8);
        bus.publish(1);
        let mut sub = bus.subscribe();
        bus.publish(2);
        assert_eq!(sub.try_recv(), Some(Delivery::Event(2)));
    }

    #[test]
    fn overflow_drops_oldest_and_emits_one_meta_event() {
        let bus: Bus<u32> = Bus::new(2);
        let mut sub = bus.subscribe();
        bus.publish(1);
        bus.publish(2);
        bus.publish(3); // drops 1
        bus.publish(4); // drops 2
        assert_eq!(sub.try_recv(), Some(Delivery::Overflow { dropped: 2 }));
        assert_eq!(sub.try_recv(), Some(Delivery::Event(3)));
        assert_eq!(sub.try_recv(), Some(Delivery::Event(4)));
    }

    #[test]
    fn delivered_count_never_exceeds_published_count() {
        let bus: Bus<u32> = Bus::new(4);
        let mut sub = bus.subscribe();
        for i in 0..100 {
            bus.publish(i);
        }
        let mut delivered = 0u32;
        while let Some(d) = sub.try_recv() {
            if matches!(d, Delivery::Event(_)) {
                delivered += 1;
            }
        }
        assert!(delivered <= 100);
    }

    #[test]
    fn dropping_subscription_deregisters_it() {
        let bus: Bus<u32> = Bus::new(4);
        {
            let _sub = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn recv_timeout_returns_none_when_nothing_arrives() {
        let bus: Bus<u32> = Bus::new(4);
        let mut sub = bus.subscribe();
        assert_eq!(sub.recv_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn independent_subscribers_each_get_every_event() {
        let bus: Bus<u32> = Bus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(42);
        assert_eq!(a.try_recv(), Some(Delivery::Event(42)));
        assert_eq!(b.try_recv(), Some(Delivery::Event(42)));
    }
}
