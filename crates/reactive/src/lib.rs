//! Realm Reactive - push-based reactive dataflow engine.
//!
//! Consumers declare typed nodes, wire them together with projections and
//! publish values into one or more root nodes. Each publish runs a memoized
//! execution plan to completion, evaluating every affected node at most once,
//! and then notifies subscribers.
//!
//! # Core Concepts
//!
//! - `Node<T>`: Typed handle to an event stream or a cell (persisted value)
//! - `Connection`: A projection from source and pull nodes into a sink
//! - `ExecutionPlan`: Evaluation order for one set of root nodes
//! - `Realm`: Owns nodes, graph, plans and subscriptions; runs publishes
//! - `Scheduler`: Injected timer capability for time-based operators
//!
//! Sources trigger a projection; pulls are only sampled. A projection that
//! does not emit prunes everything downstream of it for the current publish.
//!
//! # Example
//!
//! ```
//! use realm_reactive::{filter, map, Realm};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let realm = Realm::new();
//! let input = realm.node::<i32>();
//! let doubled = realm.pipe(input, (filter(|v: &i32| *v > 0), map(|v: &i32| v * 2)));
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let seen_clone = seen.clone();
//! realm.subscribe(doubled, move |v: &i32| seen_clone.borrow_mut().push(*v));
//!
//! realm.publish(input, -1);
//! realm.publish(input, 21);
//! assert_eq!(*seen.borrow(), vec![42]);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod graph;
pub mod node;
pub mod operators;
pub mod plan;
pub mod realm;
pub mod scheduler;
pub mod subscription;

pub use graph::{Args, Connection, Emit, Projection};
pub use node::{AnyNode, Distinct, Node};
pub use operators::{
    debounce_time, delay_with_microtask, filter, map, map_to, on_next, once,
    pass_only_after_node_has_emitted_before, scan, throttle_time, with_latest_from,
    with_latest_from2, Operator,
};
pub use plan::{ExecutionPlan, PlanKey};
pub use realm::{PubBatch, Realm, RealmBuilder, Unsubscribe, WeakRealm};
pub use scheduler::{Scheduler, Task, TimerId, VirtualScheduler};
pub use subscription::{SubscriptionId, ValueCallback};

#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;

// Re-export commonly used types from dependencies
pub use realm_core::{AnyValue, Error, NodeId, ProjectionId, Result};
