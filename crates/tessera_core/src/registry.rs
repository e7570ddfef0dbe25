//! Id issuance and guid lookup
//!
//! The one piece of state shared by every instance a runtime creates. It is
//! an explicit service handed to the factory rather than a global, so tests
//! and embedders can run several runtimes side by side.

use std::cell::{Cell, RefCell};
use std::fmt;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::ComposeError;
use crate::instance::{Instance, WeakInstance};

/// Monotonically increasing id generator
///
/// Ids start at 1 and are never reissued, even after the instance holding
/// one is destroyed.
#[derive(Debug, Default)]
pub struct Sequence {
    last: Cell<u64>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let id = self.last.get() + 1;
        self.last.set(id);
        id
    }

    /// The most recently issued id (0 before the first)
    pub fn last(&self) -> u64 {
        self.last.get()
    }
}

/// Issues instance ids and resolves guids to live instances
pub struct Registry {
    prefix: String,
    sequence: Sequence,
    live: RefCell<FxHashMap<String, WeakInstance>>,
}

impl Registry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: Sequence::new(),
            live: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Issue the next id and its guid
    pub fn issue(&self) -> (u64, String) {
        let id = self.sequence.next();
        (id, format!("{}_{}", self.prefix, id))
    }

    /// Number of ids issued so far
    pub fn issued(&self) -> u64 {
        self.sequence.last()
    }

    /// Record a new instance, dropping entries for released ones
    pub(crate) fn register(&self, instance: &Instance) {
        let mut live = self.live.borrow_mut();
        live.retain(|_, w| w.upgrade().is_some());
        live.insert(instance.guid().to_string(), instance.downgrade());
    }

    pub(crate) fn forget(&self, guid: &str) -> bool {
        self.live.borrow_mut().remove(guid).is_some()
    }

    /// Resolve a guid to a live instance
    pub fn lookup(&self, guid: &str) -> Option<Instance> {
        self.live.borrow().get(guid).and_then(WeakInstance::upgrade)
    }

    /// Number of registered instances that are still alive
    pub fn live_count(&self) -> usize {
        self.live
            .borrow()
            .values()
            .filter(|w| w.upgrade().is_some())
            .count()
    }

    /// Drop entries whose instance was released without being destroyed
    pub fn prune(&self) -> usize {
        let mut live = self.live.borrow_mut();
        let before = live.len();
        live.retain(|_, w| w.upgrade().is_some());
        before - live.len()
    }

    /// Destroy every live instance, newest first
    ///
    /// Returns how many instances were destroyed along with any teardown
    /// failures. Instances whose `destroy` listeners cancel are left alive.
    pub fn unload(&self) -> (usize, Vec<ComposeError>) {
        let mut instances: Vec<Instance> = self
            .live
            .borrow()
            .values()
            .filter_map(WeakInstance::upgrade)
            .collect();
        instances.sort_by_key(|i| std::cmp::Reverse(i.id()));

        let mut destroyed = 0;
        let mut errors = Vec::new();
        for instance in instances {
            match instance.destroy() {
                Ok(true) => destroyed += 1,
                Ok(false) => {}
                Err(err) => errors.push(err),
            }
        }
        self.prune();
        debug!(destroyed, failures = errors.len(), "registry unloaded");
        (destroyed, errors)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new("tessera")
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("prefix", &self.prefix)
            .field("issued", &self.issued())
            .field("registered", &self.live.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{MethodSet, Schema};
    use crate::factory::Factory;
    use crate::value::ValueMap;

    #[test]
    fn test_ids_strictly_increase() {
        let registry = Registry::new("t");
        let mut last = 0;
        for _ in 0..100 {
            let (id, guid) = registry.issue();
            assert!(id > last);
            assert_eq!(guid, format!("t_{id}"));
            last = id;
        }
        assert_eq!(registry.issued(), 100);
    }

    #[test]
    fn test_register_drops_released_instances() {
        let factory = Factory::new();
        factory
            .create("Thing", None, &[], Schema::new(), MethodSet::new())
            .unwrap();
        let registry = factory.registry();

        let released = factory.instantiate("Thing", &ValueMap::new()).unwrap();
        let guid = released.guid().to_string();
        drop(released);
        assert_eq!(registry.live.borrow().len(), 1);

        let kept = factory.instantiate("Thing", &ValueMap::new()).unwrap();
        assert_eq!(registry.live.borrow().len(), 1);
        assert!(registry.lookup(&guid).is_none());
        assert!(registry.lookup(kept.guid()).unwrap().ptr_eq(&kept));
    }

    #[test]
    fn test_lookup_unknown_guid() {
        let registry = Registry::default();
        assert!(registry.lookup("tessera_1").is_none());
        assert_eq!(registry.live_count(), 0);
    }
}
