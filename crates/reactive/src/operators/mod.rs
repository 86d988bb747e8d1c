//! Operator library.
//!
//! Every operator is sugar over `Realm::node` and `Realm::connect`: applying
//! it allocates a fresh sink node and returns it, so operators chain left to
//! right with `Realm::pipe`:
//!
//! - Map: `map`, `map_to`, `scan`
//! - Filter: `filter`, `once`, `pass_only_after_node_has_emitted_before`
//! - Join: `with_latest_from`, `with_latest_from2`, `on_next`, and the
//!   multi-input `Realm::combine`, `Realm::combine3`, `Realm::merge`
//! - Time: `debounce_time`, `throttle_time`, `delay_with_microtask`
//!
//! # Example
//!
//! ```ignore
//! let query = realm.node::<String>();
//! let trimmed = realm.pipe(
//!     query,
//!     (
//!         map(|q: &String| q.trim().to_string()),
//!         filter(|q: &String| !q.is_empty()),
//!         debounce_time(Duration::from_millis(250)),
//!     ),
//! );
//! ```

mod filter;
mod join;
mod map;
mod time;

pub use filter::{filter, once, pass_only_after_node_has_emitted_before, Filter, Once, PassOnlyAfter};
pub use join::{on_next, with_latest_from, with_latest_from2, OnNext, WithLatestFrom, WithLatestFrom2};
pub use map::{map, map_to, scan, Map, MapTo, Scan};
pub use time::{debounce_time, delay_with_microtask, throttle_time, DebounceTime, DelayWithMicrotask, ThrottleTime};

use crate::node::Node;
use crate::realm::Realm;

/// A node-to-node transformation.
pub trait Operator<In> {
    /// Value type of the produced node.
    type Out;

    /// Wires the operator onto `input` and returns its output node.
    fn apply(self, realm: &Realm, input: Node<In>) -> Node<Self::Out>;
}

macro_rules! impl_operator_tuple {
    ($head:ident) => {
        impl<In, $head> Operator<In> for ($head,)
        where
            $head: Operator<In>,
        {
            type Out = <$head as Operator<In>>::Out;

            fn apply(self, realm: &Realm, input: Node<In>) -> Node<Self::Out> {
                self.0.apply(realm, input)
            }
        }
    };
    ($head:ident, $($tail:ident),+) => {
        impl<In, $head, $($tail),+> Operator<In> for ($head, $($tail),+)
        where
            $head: Operator<In>,
            ($($tail,)+): Operator<<$head as Operator<In>>::Out>,
        {
            type Out = <($($tail,)+) as Operator<<$head as Operator<In>>::Out>>::Out;

            #[allow(non_snake_case)]
            fn apply(self, realm: &Realm, input: Node<In>) -> Node<Self::Out> {
                let ($head, $($tail),+) = self;
                let next = $head.apply(realm, input);
                ($($tail,)+).apply(realm, next)
            }
        }

        impl_operator_tuple!($($tail),+);
    };
}

impl_operator_tuple!(A, B, C, D, E, F, G, H);
