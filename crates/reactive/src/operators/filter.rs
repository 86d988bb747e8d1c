//! Operators that let values through conditionally.

use super::Operator;
use crate::graph::Connection;
use crate::node::Node;
use crate::realm::Realm;
use alloc::rc::Rc;
use core::cell::Cell;
use core::marker::PhantomData;
use core::time::Duration;

/// Operator returned by [`filter`].
pub struct Filter<F, T> {
    predicate: F,
    _marker: PhantomData<fn(&T)>,
}

/// Passes values for which `predicate` holds; declines otherwise.
///
/// A declined value prunes everything downstream of the filter for the
/// current publish.
///
/// # Example
///
/// ```ignore
/// let evens = realm.pipe(numbers, filter(|n: &i32| n % 2 == 0));
/// ```
pub fn filter<T, F>(predicate: F) -> Filter<F, T>
where
    F: Fn(&T) -> bool + 'static,
{
    Filter {
        predicate,
        _marker: PhantomData,
    }
}

impl<T, F> Operator<T> for Filter<F, T>
where
    T: 'static,
    F: Fn(&T) -> bool + 'static,
{
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let predicate = self.predicate;
        realm.connect(
            Connection::new(sink, move |args, emit| {
                if let (Some(raw), Some(value)) = (args.raw(0), args.get::<T>(0)) {
                    if predicate(value) {
                        emit.forward(raw);
                    }
                }
            })
            .source(input),
        );
        sink
    }
}

/// Operator returned by [`once`].
pub struct Once<T> {
    _marker: PhantomData<fn(&T)>,
}

/// Passes the first value only; every later value is declined.
pub fn once<T>() -> Once<T> {
    Once {
        _marker: PhantomData,
    }
}

impl<T: 'static> Operator<T> for Once<T> {
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let passed = Cell::new(false);
        realm.connect(
            Connection::new(sink, move |args, emit| {
                if passed.get() {
                    return;
                }
                if let Some(raw) = args.raw(0) {
                    passed.set(true);
                    emit.forward(raw);
                }
            })
            .source(input),
        );
        sink
    }
}

/// Operator returned by [`pass_only_after_node_has_emitted_before`].
pub struct PassOnlyAfter<S, T> {
    starter: Node<S>,
    window: Node<Duration>,
    _marker: PhantomData<fn(&T)>,
}

/// Passes values only while less than `window` has elapsed since `starter`
/// last emitted, as measured by the realm's scheduler clock.
///
/// `window` is sampled, not reactive; it should be a cell. Before `starter`
/// has emitted at all nothing passes. The starter is timestamped during the
/// publish walk, so a starter and an input published together pass.
pub fn pass_only_after_node_has_emitted_before<S, T>(
    starter: Node<S>,
    window: Node<Duration>,
) -> PassOnlyAfter<S, T> {
    PassOnlyAfter {
        starter,
        window,
        _marker: PhantomData,
    }
}

impl<S, T> Operator<T> for PassOnlyAfter<S, T>
where
    S: 'static,
    T: 'static,
{
    type Out = T;

    fn apply(self, realm: &Realm, input: Node<T>) -> Node<T> {
        let sink = realm.node::<T>();
        let scheduler = realm.scheduler();
        let started: Rc<Cell<Option<Duration>>> = Rc::new(Cell::new(None));

        // Pulled by the gate below so it is always evaluated first.
        let stamp = realm.node::<()>();
        let clock = scheduler.clone();
        let started_clone = started.clone();
        realm.connect(
            Connection::new(stamp, move |args, emit| {
                if args.raw(0).is_some() {
                    started_clone.set(Some(clock.now()));
                    emit.emit(());
                }
            })
            .source(self.starter),
        );

        realm.connect(
            Connection::new(sink, move |args, emit| {
                let (Some(raw), Some(window)) = (args.raw(0), args.get::<Duration>(1)) else {
                    return;
                };
                if let Some(started) = started.get() {
                    if scheduler.now() < started + *window {
                        emit.forward(raw);
                    }
                }
            })
            .source(input)
            .pull(self.window)
            .pull(stamp),
        );
        sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::PubBatch;
    use crate::scheduler::VirtualScheduler;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    fn collect<T: Clone + 'static>(realm: &Realm, node: Node<T>) -> Rc<RefCell<Vec<T>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        realm.subscribe(node, move |v: &T| seen_clone.borrow_mut().push(v.clone()));
        seen
    }

    #[test]
    fn test_filter() {
        let realm = Realm::new();
        let input = realm.node::<i32>();
        let positive = realm.pipe(input, filter(|v: &i32| *v > 0));
        let seen = collect(&realm, positive);

        for v in [-1, 3, 0, 7] {
            realm.publish(input, v);
        }
        assert_eq!(*seen.borrow(), vec![3, 7]);
    }

    #[test]
    fn test_once() {
        let realm = Realm::new();
        let input = realm.node::<i32>();
        let first = realm.pipe(input, once());
        let seen = collect(&realm, first);

        realm.publish(input, 1);
        realm.publish(input, 2);
        realm.publish(input, 3);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_pass_only_after_node_has_emitted_before() {
        let scheduler = Rc::new(VirtualScheduler::new());
        let realm = Realm::builder().scheduler(scheduler.clone()).build();
        let starter = realm.node::<()>();
        let window = realm.cell(Duration::from_millis(100));
        let input = realm.node::<i32>();
        let gated = realm.pipe(input, pass_only_after_node_has_emitted_before(starter, window));
        let seen = collect(&realm, gated);

        realm.publish(input, 1);
        assert!(seen.borrow().is_empty());

        realm.publish(starter, ());
        realm.publish(input, 2);
        scheduler.advance(Duration::from_millis(99));
        realm.publish(input, 3);
        scheduler.advance(Duration::from_millis(1));
        realm.publish(input, 4);
        assert_eq!(*seen.borrow(), vec![2, 3]);

        realm.publish(starter, ());
        realm.publish(input, 5);
        assert_eq!(*seen.borrow(), vec![2, 3, 5]);
    }

    #[test]
    fn test_pass_only_after_starter_in_same_batch() {
        let scheduler = Rc::new(VirtualScheduler::new());
        let realm = Realm::builder().scheduler(scheduler.clone()).build();
        let starter = realm.node::<()>();
        let window = realm.cell(Duration::from_millis(10));
        let input = realm.node::<i32>();
        let gated = realm.pipe(input, pass_only_after_node_has_emitted_before(starter, window));
        let seen = collect(&realm, gated);

        realm.publish_all(PubBatch::new().with(starter, ()).with(input, 1));
        assert_eq!(*seen.borrow(), vec![1]);

        scheduler.advance(Duration::from_millis(10));
        realm.publish_all(PubBatch::new().with(input, 2).with(starter, ()));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
