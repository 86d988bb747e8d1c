//! Realm Core - shared identifiers, erased values and errors for the realm
//! dataflow engine.
//!
//! This crate provides the foundational types used by every other realm crate:
//!
//! - `NodeId`: Opaque arena index of a node (cell or event stream)
//! - `ProjectionId`: Opaque index of a registered projection
//! - `AnyValue`: Type-erased, cheaply clonable value flowing through the graph
//! - `Error`: Error types for labeling and system composition
//!
//! # Example
//!
//! ```rust
//! use realm_core::{erase, downcast, NodeId};
//!
//! let id = NodeId::from_index(3);
//! assert_eq!(id.index(), 3);
//!
//! let value = erase(42i32);
//! assert_eq!(downcast::<i32>(&value), Some(&42));
//! assert_eq!(downcast::<u8>(&value), None);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;
mod id;
mod value;

pub use error::{Error, Result};
pub use id::{NodeId, ProjectionId};
pub use value::{downcast, erase, value_type_id, AnyValue};
