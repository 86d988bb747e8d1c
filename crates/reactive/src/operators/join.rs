//! Operators over several nodes.

use super::Operator;
use crate::graph::Connection;
use crate::node::Node;
use crate::realm::Realm;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::marker::PhantomData;

/// Operator returned by [`with_latest_from`].
pub struct WithLatestFrom<In, P> {
    other: Node<P>,
    _marker: PhantomData<fn(&In)>,
}

/// Pairs every input value with the current value of `other`.
///
/// `other` is a pull: it never triggers the output. Declines while `other`
/// has no value, so `other` should be a cell.
pub fn with_latest_from<In, P>(other: Node<P>) -> WithLatestFrom<In, P> {
    WithLatestFrom {
        other,
        _marker: PhantomData,
    }
}

impl<In, P> Operator<In> for WithLatestFrom<In, P>
where
    In: Clone + 'static,
    P: Clone + 'static,
{
    type Out = (In, P);

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<(In, P)> {
        let sink = realm.node::<(In, P)>();
        realm.connect(
            Connection::new(sink, |args, emit| {
                if let (Some(value), Some(other)) = (args.get::<In>(0), args.get::<P>(1)) {
                    emit.emit((value.clone(), other.clone()));
                }
            })
            .source(input)
            .pull(self.other),
        );
        sink
    }
}

/// Operator returned by [`with_latest_from2`].
pub struct WithLatestFrom2<In, P, Q> {
    first: Node<P>,
    second: Node<Q>,
    _marker: PhantomData<fn(&In)>,
}

/// Like [`with_latest_from`] with two sampled nodes.
pub fn with_latest_from2<In, P, Q>(first: Node<P>, second: Node<Q>) -> WithLatestFrom2<In, P, Q> {
    WithLatestFrom2 {
        first,
        second,
        _marker: PhantomData,
    }
}

impl<In, P, Q> Operator<In> for WithLatestFrom2<In, P, Q>
where
    In: Clone + 'static,
    P: Clone + 'static,
    Q: Clone + 'static,
{
    type Out = (In, P, Q);

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<(In, P, Q)> {
        let sink = realm.node::<(In, P, Q)>();
        realm.connect(
            Connection::new(sink, |args, emit| {
                if let (Some(value), Some(first), Some(second)) =
                    (args.get::<In>(0), args.get::<P>(1), args.get::<Q>(2))
                {
                    emit.emit((value.clone(), first.clone(), second.clone()));
                }
            })
            .source(input)
            .pull(self.first)
            .pull(self.second),
        );
        sink
    }
}

/// Operator returned by [`on_next`].
pub struct OnNext<In, B> {
    buffer: Node<B>,
    _marker: PhantomData<fn(&In)>,
}

/// Holds the latest input value until `buffer` next emits, then emits
/// `(input, buffer)` once and clears the held value.
///
/// Emissions of `buffer` with nothing held are declined.
pub fn on_next<In, B>(buffer: Node<B>) -> OnNext<In, B> {
    OnNext {
        buffer,
        _marker: PhantomData,
    }
}

impl<In, B> Operator<In> for OnNext<In, B>
where
    In: Clone + 'static,
    B: Clone + 'static,
{
    type Out = (In, B);

    fn apply(self, realm: &Realm, input: Node<In>) -> Node<(In, B)> {
        let sink = realm.node::<(In, B)>();
        let held: Rc<RefCell<Option<In>>> = Rc::new(RefCell::new(None));

        // The input only fills the slot; this projection never emits.
        let fill = held.clone();
        realm.connect(
            Connection::new(sink, move |args, _| {
                if let Some(value) = args.get::<In>(0) {
                    *fill.borrow_mut() = Some(value.clone());
                }
            })
            .source(input),
        );

        realm.connect(
            Connection::new(sink, move |args, emit| {
                let Some(buffered) = args.get::<B>(0) else {
                    return;
                };
                let value = held.borrow_mut().take();
                if let Some(value) = value {
                    emit.emit((value, buffered.clone()));
                }
            })
            .source(self.buffer),
        );
        sink
    }
}

impl Realm {
    /// Combines two nodes: whenever either emits, emits the latest value of
    /// both. Declines until each has produced a value.
    ///
    /// Latest values are remembered by the combinator itself, so event nodes
    /// combine as well as cells.
    pub fn combine<A, B>(&self, a: Node<A>, b: Node<B>) -> Node<(A, B)>
    where
        A: Clone + 'static,
        B: Clone + 'static,
    {
        let sink = self.node::<(A, B)>();
        let latest: RefCell<(Option<A>, Option<B>)> = RefCell::new((None, None));
        self.connect(
            Connection::new(sink, move |args, emit| {
                let mut latest = latest.borrow_mut();
                if let Some(a) = args.get::<A>(0) {
                    latest.0 = Some(a.clone());
                }
                if let Some(b) = args.get::<B>(1) {
                    latest.1 = Some(b.clone());
                }
                if let (Some(a), Some(b)) = &*latest {
                    emit.emit((a.clone(), b.clone()));
                }
            })
            .source(a)
            .source(b),
        );
        sink
    }

    /// Three-input form of [`Realm::combine`].
    pub fn combine3<A, B, C>(&self, a: Node<A>, b: Node<B>, c: Node<C>) -> Node<(A, B, C)>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        C: Clone + 'static,
    {
        let sink = self.node::<(A, B, C)>();
        let latest: RefCell<(Option<A>, Option<B>, Option<C>)> = RefCell::new((None, None, None));
        self.connect(
            Connection::new(sink, move |args, emit| {
                let mut latest = latest.borrow_mut();
                if let Some(a) = args.get::<A>(0) {
                    latest.0 = Some(a.clone());
                }
                if let Some(b) = args.get::<B>(1) {
                    latest.1 = Some(b.clone());
                }
                if let Some(c) = args.get::<C>(2) {
                    latest.2 = Some(c.clone());
                }
                if let (Some(a), Some(b), Some(c)) = &*latest {
                    emit.emit((a.clone(), b.clone(), c.clone()));
                }
            })
            .source(a)
            .source(b)
            .source(c),
        );
        sink
    }

    /// Merges two nodes of the same type into one. When both emit in the
    /// same publish, `b` (registered last) wins.
    pub fn merge<T: 'static>(&self, a: Node<T>, b: Node<T>) -> Node<T> {
        let sink = self.node::<T>();
        self.link(a, sink);
        self.link(b, sink);
        sink
    }
}
