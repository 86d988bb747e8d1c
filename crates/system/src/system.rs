//! System composition.
//!
//! A system is a named constructor that wires nodes into a realm and returns
//! the labels it exposes. Systems declare the systems they depend on; a
//! dependency's labels are handed to the constructor, in declaration order,
//! once the dependency has been constructed.
//!
//! Composition initializes every reachable system exactly once, even when
//! several systems share a dependency, and merges all labels into the
//! runtime's label table.

use crate::keyed::LabeledRealm;
use crate::label::{LabelTable, Labels};
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use hashbrown::{HashMap, HashSet};
use realm_core::{Error, Result};
use realm_reactive::Realm;
use tracing::debug;

static NEXT_SYSTEM_ID: AtomicU32 = AtomicU32::new(0);

/// Unique identifier of a system definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SystemId(u32);

type Constructor = Box<dyn Fn(&Realm, &[Labels]) -> Result<Labels>>;

struct SystemDef {
    id: SystemId,
    name: String,
    dependencies: Vec<System>,
    /// Added through `depends_on`; weak so that a cycle does not leak
    late: RefCell<Vec<Weak<SystemDef>>>,
    constructor: Constructor,
}

/// A shareable system definition.
#[derive(Clone)]
pub struct System {
    def: Rc<SystemDef>,
}

/// Defines a system.
///
/// # Example
///
/// ```ignore
/// let counter = system("counter", vec![], |realm, _| {
///     let count = realm.cell(0i32);
///     let increment = realm.node::<()>();
///     realm.change_with(count, increment, |c, _| c + 1);
///     Ok(Labels::new().with("count", count).with("increment", increment))
/// });
/// ```
pub fn system<F>(name: impl Into<String>, dependencies: Vec<System>, constructor: F) -> System
where
    F: Fn(&Realm, &[Labels]) -> Result<Labels> + 'static,
{
    System {
        def: Rc::new(SystemDef {
            id: SystemId(NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            dependencies,
            late: RefCell::new(Vec::new()),
            constructor: Box::new(constructor),
        }),
    }
}

impl System {
    #[inline]
    pub fn id(&self) -> SystemId {
        self.def.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Returns the declared dependencies that are still alive, in
    /// declaration order.
    pub fn dependencies(&self) -> Vec<System> {
        let mut dependencies = self.def.dependencies.clone();
        dependencies.extend(
            self.def
                .late
                .borrow()
                .iter()
                .filter_map(Weak::upgrade)
                .map(|def| System { def }),
        );
        dependencies
    }

    /// Declares one more dependency after definition, for systems that are
    /// defined before the systems they need.
    ///
    /// The dependency is held weakly: the caller keeps it alive until
    /// composition. Dependencies that end up forming a cycle are rejected at
    /// composition.
    pub fn depends_on(&self, dependency: &System) {
        self.def.late.borrow_mut().push(Rc::downgrade(&dependency.def));
    }

    /// Like `dependencies`, but fails if a `depends_on` target was dropped.
    fn resolve_dependencies(&self) -> Result<Vec<System>> {
        let mut dependencies = self.def.dependencies.clone();
        for late in self.def.late.borrow().iter() {
            match late.upgrade() {
                Some(def) => dependencies.push(System { def }),
                None => {
                    return Err(Error::construction(
                        self.name(),
                        "a dependency was dropped before composition",
                    ))
                }
            }
        }
        Ok(dependencies)
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dependencies: Vec<String> = self
            .dependencies()
            .iter()
            .map(|d| d.def.name.clone())
            .collect();
        f.debug_struct("System")
            .field("id", &self.def.id)
            .field("name", &self.def.name)
            .field("dependencies", &dependencies)
            .finish()
    }
}

/// Memoized depth-first initializer.
struct Composer {
    realm: Realm,
    table: LabelTable,
    built: HashMap<SystemId, Labels>,
    in_progress: HashSet<SystemId>,
}

impl Composer {
    fn new(realm: Realm) -> Self {
        Self {
            realm,
            table: LabelTable::new(),
            built: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    fn init(&mut self, system: &System) -> Result<Labels> {
        let id = system.id();
        if let Some(labels) = self.built.get(&id) {
            return Ok(labels.clone());
        }
        if !self.in_progress.insert(id) {
            return Err(Error::dependency_cycle(system.name()));
        }

        let mut inputs = Vec::new();
        for dependency in system.resolve_dependencies()? {
            inputs.push(self.init(&dependency)?);
        }

        debug!(system = system.name(), dependencies = inputs.len(), "constructing system");
        let labels = (system.def.constructor)(&self.realm, &inputs)?;
        self.table.label(&labels)?;

        self.in_progress.remove(&id);
        self.built.insert(id, labels.clone());
        Ok(labels)
    }

    fn finish(self) -> LabeledRealm {
        debug!(
            systems = self.built.len(),
            labels = self.table.len(),
            "realm composed"
        );
        LabeledRealm::new(self.realm, self.table)
    }
}

/// Composes `systems` and everything they depend on into `realm`.
///
/// Use this with a realm from `Realm::builder()` to pick the scheduler.
pub fn compose(realm: Realm, systems: &[System]) -> Result<LabeledRealm> {
    let mut composer = Composer::new(realm);
    for system in systems {
        composer.init(system)?;
    }
    Ok(composer.finish())
}

/// Composes `systems` into a fresh realm with the default scheduler.
pub fn realm_factory(systems: &[System]) -> Result<LabeledRealm> {
    compose(Realm::new(), systems)
}
