//! Tessera Runtime
//!
//! The entry point that owns the factory, its registry and the runtime
//! configuration.

use std::path::Path;
use std::rc::Rc;

use tracing::info;

use crate::config::RuntimeConfig;
use crate::error::{ComposeError, ConfigError};
use crate::factory::Factory;
use crate::instance::Instance;
use crate::registry::Registry;

/// The Tessera runtime - owns every type, capability and live instance
pub struct TesseraRuntime {
    factory: Factory,
}

impl TesseraRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        info!(
            id_prefix = %config.id_prefix,
            read_only_init = ?config.read_only_init,
            teardown = ?config.teardown,
            "runtime started"
        );
        Self {
            factory: Factory::with_config(config),
        }
    }

    /// Start a runtime configured from a TOML file
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::with_config(RuntimeConfig::load(path)?))
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn registry(&self) -> &Rc<Registry> {
        self.factory.registry()
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.factory.config()
    }

    /// Resolve a guid to a live instance
    pub fn lookup(&self, guid: &str) -> Option<Instance> {
        self.registry().lookup(guid)
    }

    /// Destroy every live instance
    pub fn unload(&self) -> (usize, Vec<ComposeError>) {
        self.registry().unload()
    }

    /// Get statistics about the runtime
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            type_count: self.factory.type_names().len(),
            issued_ids: self.registry().issued(),
            live_instances: self.registry().live_count(),
        }
    }
}

impl Default for TesseraRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Registered types, root included
    pub type_count: usize,
    pub issued_ids: u64,
    pub live_instances: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeDescriptor, Observable};
    use crate::class::{MethodSet, Schema};
    use crate::value::{Value, ValueMap};
    use std::cell::Cell;

    #[test]
    fn test_runtime_integration() {
        let runtime = TesseraRuntime::new();
        let destroyed = Rc::new(Cell::new(0));
        let counter = destroyed.clone();

        runtime
            .factory()
            .create(
                "Counter",
                None,
                &[],
                Schema::new().attr("count", AttributeDescriptor::new().value(0)),
                MethodSet::new().destructor(move |_| {
                    counter.set(counter.get() + 1);
                    Ok(())
                }),
            )
            .unwrap();

        let a = runtime.factory().instantiate("Counter", &ValueMap::new()).unwrap();
        let b = runtime.factory().instantiate("Counter", &ValueMap::new()).unwrap();
        a.set("count", 3).unwrap();

        let looked_up = runtime.lookup(a.guid()).unwrap();
        assert_eq!(looked_up.get("count"), Some(Value::Int(3)));

        let stats = runtime.stats();
        assert_eq!(stats.type_count, 2);
        assert_eq!(stats.issued_ids, 2);
        assert_eq!(stats.live_instances, 2);

        let (count, errors) = runtime.unload();
        assert_eq!(count, 2);
        assert!(errors.is_empty());
        assert_eq!(destroyed.get(), 2);
        assert!(a.is_destroyed() && b.is_destroyed());
        assert_eq!(runtime.stats().live_instances, 0);
        assert_eq!(runtime.stats().issued_ids, 2);
    }
}
