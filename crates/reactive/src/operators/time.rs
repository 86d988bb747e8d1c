//! Timer-based operators.
//!
//! These are the only asynchronous boundaries of a realm. Each one subscribes
//! to its input and, on the realm's scheduler, later publishes into its output
//! in a fresh, independent publish. Every operator instance owns at most one
//! pending timer or microtask.

use super::Operator;
use crate::node::Node;
use crate::realm::{PubBatch, Realm, WeakRealm};
use crate::scheduler::{Scheduler, TimerId};
use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::marker::PhantomData;
use core::time::Duration;
use realm_core::AnyValue;
use tracing::warn;

/// Publishes an erased value into `sink` if the realm is still alive.
fn deliver<T: 'static>(realm: &WeakRealm, sink: Node<T>, value: AnyValue, operator: &'static str) {
    let Some(realm) = realm.upgrade() else {
        warn!(operator, node = %sink.id(), "timer fired after its realm was dropped");
        return;
    };
    let mut batch = PubBatch::new();
    if batch.insert_erased(sink.erase(), value) {
        realm.publish_all(batch);
    }
}

/// Operator returned by [`debounce_time`].
pub struct DebounceTime<T> {
    delay: Duration,
    _marker: PhantomData<fn(&T)>,
}

/// Emits the latest value once `delay` has passed without a newer one.
///
/// Every input restarts the single pending timer.
pub fn debounce_time<T>(delay: Duration) -> DebounceTime<T> {
    DebounceTime {
        delay,
        _marker: PhantomData,
    }
}

impl<T: 'static> Operator<T> for DebounceTime<T> {
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let delay = self.delay;
        let scheduler = realm.scheduler();
        let weak = realm.downgrade();
        let pending: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));

        realm.subscribe_raw(
            input.id(),
            Rc::new(move |value: &AnyValue| {
                if let Some(timer) = pending.borrow_mut().take() {
                    scheduler.cancel(timer);
                }
                let weak = weak.clone();
                let value = value.clone();
                let slot = pending.clone();
                let timer = scheduler.schedule(
                    delay,
                    Box::new(move || {
                        slot.borrow_mut().take();
                        deliver(&weak, sink, value, "debounce_time");
                    }),
                );
                *pending.borrow_mut() = Some(timer);
            }),
        );
        sink
    }
}

/// Operator returned by [`throttle_time`].
pub struct ThrottleTime<T> {
    delay: Duration,
    _marker: PhantomData<fn(&T)>,
}

/// Emits at most once per `delay`: the first input starts a timer, later
/// inputs only replace the value it will emit.
pub fn throttle_time<T>(delay: Duration) -> ThrottleTime<T> {
    ThrottleTime {
        delay,
        _marker: PhantomData,
    }
}

impl<T: 'static> Operator<T> for ThrottleTime<T> {
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let delay = self.delay;
        let scheduler = realm.scheduler();
        let weak = realm.downgrade();
        let latest = PendingValue::new();

        realm.subscribe_raw(
            input.id(),
            Rc::new(move |value: &AnyValue| {
                if !latest.replace(value.clone()) {
                    return;
                }
                let weak = weak.clone();
                let latest = latest.clone();
                scheduler.schedule(
                    delay,
                    Box::new(move || {
                        if let Some(value) = latest.take() {
                            deliver(&weak, sink, value, "throttle_time");
                        }
                    }),
                );
            }),
        );
        sink
    }
}

/// Operator returned by [`delay_with_microtask`].
pub struct DelayWithMicrotask<T> {
    _marker: PhantomData<fn(&T)>,
}

/// Re-emits the input from a microtask, after the current publish and its
/// subscribers have finished. Inputs arriving before the microtask runs
/// replace its value.
pub fn delay_with_microtask<T>() -> DelayWithMicrotask<T> {
    DelayWithMicrotask {
        _marker: PhantomData,
    }
}

impl<T: 'static> Operator<T> for DelayWithMicrotask<T> {
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let scheduler = realm.scheduler();
        let weak = realm.downgrade();
        let latest = PendingValue::new();

        realm.subscribe_raw(
            input.id(),
            Rc::new(move |value: &AnyValue| {
                if !latest.replace(value.clone()) {
                    return;
                }
                let weak = weak.clone();
                let latest = latest.clone();
                scheduler.queue_microtask(Box::new(move || {
                    if let Some(value) = latest.take() {
                        deliver(&weak, sink, value, "delay_with_microtask");
                    }
                }));
            }),
        );
        sink
    }
}

/// The value a pending task will emit, shared between the subscriber that
/// fills it and the task that drains it.
#[derive(Clone)]
struct PendingValue {
    slot: Rc<RefCell<Option<AnyValue>>>,
}

impl PendingValue {
    fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Stores `value`. Returns true if nothing was pending, i.e. a task
    /// must be scheduled.
    fn replace(&self, value: AnyValue) -> bool {
        self.slot.borrow_mut().replace(value).is_none()
    }

    fn take(&self) -> Option<AnyValue> {
        self.slot.borrow_mut().take()
    }
}
