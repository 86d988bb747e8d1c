//! Map, constant and fold operators.

use super::Operator;
use crate::graph::Connection;
use crate::node::Node;
use crate::realm::Realm;
use core::cell::RefCell;
use core::marker::PhantomData;

/// Operator returned by [`map`].
pub struct Map<F, In, Out> {
    f: F,
    _marker: PhantomData<fn(&In) -> Out>,
}

/// Transforms every value with `f`.
///
/// # Example
///
/// ```ignore
/// let lengths = realm.pipe(words, map(|w: &String| w.len()));
/// ```
pub fn map<In, Out, F>(f: F) -> Map<F, In, Out>
where
    F: Fn(&In) -> Out + 'static,
{
    Map {
        f,
        _marker: PhantomData,
    }
}

impl<In, Out, F> Operator<In> for Map<F, In, Out>
where
    In: 'static,
    Out: 'static,
    F: Fn(&In) -> Out + 'static,
{
    type Out = Out;

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<Out> {
        let sink = realm.node::<Out>();
        let f = self.f;
        realm.connect(
            Connection::new(sink, move |args, emit| {
                if let Some(value) = args.get::<In>(0) {
                    emit.emit(f(value));
                }
            })
            .source(input),
        );
        sink
    }
}

/// Operator returned by [`map_to`].
pub struct MapTo<V> {
    value: V,
}

/// Emits a clone of `value` whenever the input emits.
pub fn map_to<V: Clone + 'static>(value: V) -> MapTo<V> {
    MapTo { value }
}

impl<In, V> Operator<In> for MapTo<V>
where
    In: 'static,
    V: Clone + 'static,
{
    type Out = V;

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<V> {
        let sink = realm.node::<V>();
        let value = self.value;
        realm.connect(Connection::new(sink, move |_, emit| emit.emit(value.clone())).source(input));
        sink
    }
}

/// Operator returned by [`scan`].
pub struct Scan<F, In, Acc> {
    reducer: F,
    seed: Acc,
    _marker: PhantomData<fn(&In)>,
}

/// Folds every value into an accumulator and emits the new accumulator.
///
/// The accumulator lives in the operator and survives across publishes.
pub fn scan<In, Acc, F>(reducer: F, seed: Acc) -> Scan<F, In, Acc>
where
    Acc: Clone + 'static,
    F: Fn(&Acc, &In) -> Acc + 'static,
{
    Scan {
        reducer,
        seed,
        _marker: PhantomData,
    }
}

impl<In, Acc, F> Operator<In> for Scan<F, In, Acc>
where
    In: 'static,
    Acc: Clone + 'static,
    F: Fn(&Acc, &In) -> Acc + 'static,
{
    type Out = Acc;

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<Acc> {
        let sink = realm.node::<Acc>();
        let reducer = self.reducer;
        let acc = RefCell::new(self.seed);
        realm.connect(
            Connection::new(sink, move |args, emit| {
                if let Some(value) = args.get::<In>(0) {
                    let next = reducer(&acc.borrow(), value);
                    *acc.borrow_mut() = next.clone();
                    emit.emit(next);
                }
            })
            .source(input),
        );
        sink
    }
}
