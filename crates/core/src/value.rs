//! Type-erased values.
//!
//! The graph itself is dynamic about value types: every value travelling
//! between nodes is an `AnyValue`. Typed handles recover the concrete type
//! with `downcast`.

use alloc::rc::Rc;
use core::any::{Any, TypeId};

/// A reference-counted, type-erased value.
pub type AnyValue = Rc<dyn Any>;

/// Erases a value.
#[inline]
pub fn erase<T: 'static>(value: T) -> AnyValue {
    Rc::new(value)
}

/// Borrows the concrete value behind an `AnyValue`, if it has type `T`.
#[inline]
pub fn downcast<T: 'static>(value: &AnyValue) -> Option<&T> {
    value.downcast_ref::<T>()
}

/// Returns the `TypeId` of the value behind an `AnyValue` (not of the `Rc`).
#[inline]
pub fn value_type_id(value: &AnyValue) -> TypeId {
    (**value).type_id()
}
