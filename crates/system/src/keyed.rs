//! String-keyed access to a composed realm.
//!
//! `LabeledRealm` resolves names through its `LabelTable` and delegates to
//! the typed realm API. Every name is resolved and type checked before any
//! state changes, so a failed call leaves the realm untouched.

use crate::label::LabelTable;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::type_name;
use core::fmt;
use realm_core::{erase, value_type_id, AnyValue, Error, NodeId, Result};
use realm_reactive::{Args, Node, PubBatch, Realm, Unsubscribe};

/// Named root values for `LabeledRealm::pub_keys`.
#[derive(Clone, Default)]
pub struct KeyBatch {
    entries: Vec<(String, AnyValue, &'static str)>,
}

impl KeyBatch {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a value, builder style.
    pub fn with<T: 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: 'static>(&mut self, key: impl Into<String>, value: T) {
        self.entries.push((key.into(), erase(value), type_name::<T>()));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A realm together with the labels of the systems composed into it.
///
/// # Example
///
/// ```ignore
/// let runtime = realm_factory(&[counter])?;
/// runtime.sub_key("count", |v: &i32| println!("count = {}", v))?;
/// runtime.pub_key("increment", ())?;
/// ```
#[derive(Clone)]
pub struct LabeledRealm {
    realm: Realm,
    labels: Rc<LabelTable>,
}

impl LabeledRealm {
    pub fn new(realm: Realm, labels: LabelTable) -> Self {
        Self {
            realm,
            labels: Rc::new(labels),
        }
    }

    /// Returns the underlying realm.
    #[inline]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Returns the label table.
    #[inline]
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Resolves a name to a typed node.
    pub fn node<T: 'static>(&self, key: &str) -> Result<Node<T>> {
        self.labels.resolve_typed::<T>(key)
    }

    /// Publishes into a named node.
    pub fn pub_key<T: 'static>(&self, key: &str, value: T) -> Result<()> {
        let node = self.node::<T>(key)?;
        self.realm.publish(node, value);
        Ok(())
    }

    /// Publishes several named values in one atomic pass.
    ///
    /// Nothing is published unless every key resolves and every value has
    /// its node's type.
    pub fn pub_keys(&self, batch: KeyBatch) -> Result<()> {
        let mut resolved = PubBatch::new();
        for (key, value, found) in batch.entries {
            let node = self.labels.resolve(&key)?;
            if value_type_id(&value) != node.type_id() {
                return Err(Error::type_mismatch(key, node.type_name(), found));
            }
            resolved.insert_erased(node, value);
        }
        self.realm.publish_all(resolved);
        Ok(())
    }

    /// Subscribes to a named node.
    pub fn sub_key<T, F>(&self, key: &str, f: F) -> Result<Unsubscribe>
    where
        T: 'static,
        F: Fn(&T) + 'static,
    {
        let node = self.node::<T>(key)?;
        Ok(self.realm.subscribe(node, f))
    }

    /// Installs the singleton subscriber of a named node.
    pub fn singleton_sub_key<T, F>(&self, key: &str, f: F) -> Result<Unsubscribe>
    where
        T: 'static,
        F: Fn(&T) + 'static,
    {
        let node = self.node::<T>(key)?;
        Ok(self.realm.singleton_subscribe(node, f))
    }

    /// Subscribes to the combination of several named nodes.
    pub fn sub_keys<F>(&self, keys: &[&str], f: F) -> Result<Unsubscribe>
    where
        F: Fn(&Args<'_>) + 'static,
    {
        let ids = self.resolve_ids(keys)?;
        Ok(self.realm.subscribe_many(&ids, f))
    }

    /// Returns the current value of a named cell.
    pub fn get_key_value<T: Clone + 'static>(&self, key: &str) -> Result<Option<T>> {
        let node = self.node::<T>(key)?;
        Ok(self.realm.get(node))
    }

    /// Returns the current erased values of several named nodes.
    pub fn get_key_values(&self, keys: &[&str]) -> Result<Vec<Option<AnyValue>>> {
        let ids = self.resolve_ids(keys)?;
        Ok(self.realm.get_values(&ids))
    }

    fn resolve_ids(&self, keys: &[&str]) -> Result<Vec<NodeId>> {
        keys.iter()
            .map(|key| self.labels.resolve(key).map(|node| node.id()))
            .collect()
    }
}

impl fmt::Debug for LabeledRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabeledRealm")
            .field("realm", &self.realm)
            .field("labels", &self.labels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Labels;
    use alloc::vec;
    use core::cell::RefCell;
    use realm_core::downcast;

    fn runtime() -> LabeledRealm {
        let realm = Realm::new();
        let count = realm.cell(0i32);
        let name = realm.cell(String::from("realm"));
        let mut table = LabelTable::new();
        table
            .label(&Labels::new().with("count", count).with("name", name))
            .unwrap();
        LabeledRealm::new(realm, table)
    }

    #[test]
    fn test_pub_key_sub_key() {
        let runtime = runtime();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        runtime
            .sub_key("count", move |v: &i32| seen_clone.borrow_mut().push(*v))
            .unwrap();

        runtime.pub_key("count", 3i32).unwrap();
        assert_eq!(*seen.borrow(), vec![3]);
        assert_eq!(runtime.get_key_value::<i32>("count").unwrap(), Some(3));
    }

    #[test]
    fn test_pub_key_missing_label() {
        let runtime = runtime();
        let err = runtime.pub_key("nonexistent", 1i32).unwrap_err();
        assert!(err.is_missing_label());
    }

    #[test]
    fn test_pub_key_wrong_type() {
        let runtime = runtime();
        let err = runtime.pub_key("count", "three").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(runtime.get_key_value::<i32>("count").unwrap(), Some(0));
    }

    #[test]
    fn test_pub_keys_validates_before_publishing() {
        let runtime = runtime();
        let batch = KeyBatch::new()
            .with("count", 5i32)
            .with("name", 7u8);
        let err = runtime.pub_keys(batch).unwrap_err();
        assert_eq!(
            err,
            Error::type_mismatch("name", type_name::<String>(), type_name::<u8>())
        );
        assert_eq!(runtime.get_key_value::<i32>("count").unwrap(), Some(0));

        let batch = KeyBatch::new()
            .with("count", 5i32)
            .with("name", String::from("next"));
        runtime.pub_keys(batch).unwrap();
        assert_eq!(runtime.get_key_value::<i32>("count").unwrap(), Some(5));
        assert_eq!(
            runtime.get_key_value::<String>("name").unwrap().as_deref(),
            Some("next")
        );
    }

    #[test]
    fn test_sub_keys_and_get_key_values() {
        let runtime = runtime();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        runtime
            .sub_keys(&["count", "name"], move |args| {
                let count = args.get::<i32>(0).copied();
                let name = args.get::<String>(1).cloned();
                seen_clone.borrow_mut().push((count, name));
            })
            .unwrap();

        runtime.pub_key("count", 1i32).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Some(1), Some(String::from("realm")))]
        );

        let values = runtime.get_key_values(&["count", "name"]).unwrap();
        assert_eq!(values[0].as_ref().and_then(downcast::<i32>), Some(&1));
        assert!(runtime.get_key_values(&["count", "nope"]).is_err());
        assert!(runtime.sub_keys(&["nope"], |_| {}).is_err());
    }

    #[test]
    fn test_singleton_sub_key() {
        let runtime = runtime();
        let seen = Rc::new(RefCell::new(0));
        let first = seen.clone();
        runtime
            .singleton_sub_key("count", move |_: &i32| *first.borrow_mut() += 1)
            .unwrap();
        let second = seen.clone();
        runtime
            .singleton_sub_key("count", move |_: &i32| *second.borrow_mut() += 10)
            .unwrap();

        runtime.pub_key("count", 1i32).unwrap();
        assert_eq!(*seen.borrow(), 10);
    }
}
