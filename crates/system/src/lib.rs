//! Realm System - labels and system composition for realm.
//!
//! Independent sub-graphs ("systems") are assembled into one realm. Each
//! system is a constructor that wires its nodes and returns `Labels` naming
//! the nodes it exposes; composition runs every constructor once, in
//! dependency order, and merges the labels into a `LabelTable`. The result is
//! a `LabeledRealm` addressable by name.
//!
//! # Example
//!
//! ```
//! use realm_system::{realm_factory, system, Labels};
//!
//! let counter = system("counter", vec![], |realm, _| {
//!     let count = realm.cell(0i32);
//!     let increment = realm.node::<()>();
//!     realm.change_with(count, increment, |c, _| c + 1);
//!     Ok(Labels::new().with("count", count).with("increment", increment))
//! });
//!
//! let runtime = realm_factory(&[counter]).unwrap();
//! runtime.pub_key("increment", ()).unwrap();
//! assert_eq!(runtime.get_key_value::<i32>("count").unwrap(), Some(1));
//! assert!(runtime.pub_key("nonexistent", 1).is_err());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod keyed;
pub mod label;
pub mod system;

pub use keyed::{KeyBatch, LabeledRealm};
pub use label::{LabelTable, Labels};
pub use system::{compose, realm_factory, system, System, SystemId};

// Re-export commonly used types from dependencies
pub use realm_core::{Error, Result};
