//! Composition factory
//!
//! Builds [`TypeDescriptor`]s from a single parent plus any number of
//! capabilities, and constructs instances of them.
//!
//! # Resolution order
//!
//! ```text
//! template  = copy of parent template
//!           ← capability methods   (overwrite inherited, earlier capability wins)
//!           ← own methods          (overwrite everything)
//!
//! schema    = explicit schema
//!           ← capability attrs     (key by key, first writer wins)
//!           ← capability statics   (scalars only if absent, mappings key by key)
//! ```
//!
//! # Example
//!
//! ```
//! use tessera_core::attribute::{validators, AttributeDescriptor, Observable};
//! use tessera_core::class::{MethodSet, Schema};
//! use tessera_core::{Factory, Value, ValueMap};
//!
//! let factory = Factory::new();
//! factory
//!     .create(
//!         "Switch",
//!         None,
//!         &[],
//!         Schema::new().attr(
//!             "enabled",
//!             AttributeDescriptor::new().value(false).validator(validators::is_bool),
//!         ),
//!         MethodSet::new(),
//!     )
//!     .unwrap();
//!
//! let switch = factory.instantiate("Switch", &ValueMap::new()).unwrap();
//! switch.set("enabled", true).unwrap();
//! assert_eq!(switch.get("enabled"), Some(Value::Bool(true)));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::class::{Capability, CapabilityRef, MethodSet, Schema, TypeDescriptor, TypeRef};
use crate::composer;
use crate::config::RuntimeConfig;
use crate::error::{ComposeError, DependencyKind, Result};
use crate::instance::{Instance, Policies};
use crate::merge::{augment, extend, merge_statics, mix, MethodTable};
use crate::registry::Registry;
use crate::value::ValueMap;

/// Registers types and capabilities by name and instantiates them
pub struct Factory {
    root: TypeRef,
    types: RefCell<FxHashMap<String, TypeRef>>,
    capabilities: RefCell<FxHashMap<String, CapabilityRef>>,
    registry: Rc<Registry>,
    config: RuntimeConfig,
}

impl Factory {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Rc::new(Registry::new(config.id_prefix.clone()));
        Self::with_registry(config, registry)
    }

    /// Share a registry between factories
    pub fn with_registry(config: RuntimeConfig, registry: Rc<Registry>) -> Self {
        let root: TypeRef = Rc::new(TypeDescriptor::root());
        let mut types = FxHashMap::default();
        types.insert(root.name().to_string(), root.clone());
        Self {
            root,
            types: RefCell::new(types),
            capabilities: RefCell::new(FxHashMap::default()),
            registry,
            config,
        }
    }

    /// The implicit root every chain ends in
    pub fn root(&self) -> &TypeRef {
        &self.root
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a capability under its name, replacing any previous one
    pub fn register_capability(&self, capability: Capability) -> CapabilityRef {
        let capability = Rc::new(capability);
        let previous = self
            .capabilities
            .borrow_mut()
            .insert(capability.name().to_string(), capability.clone());
        if previous.is_some() {
            warn!(capability = capability.name(), "capability redefined");
        }
        capability
    }

    pub fn capability(&self, name: &str) -> Option<CapabilityRef> {
        self.capabilities.borrow().get(name).cloned()
    }

    /// Resolve a registered type (the root is registered as `Base`)
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.types.borrow().get(name).cloned()
    }

    /// Registered type names, root included
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.types.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build and register a type from registered names
    ///
    /// `parent` defaults to the root. Fails with
    /// [`ComposeError::DependencyMissing`] when a name is not registered.
    pub fn create(
        &self,
        name: &str,
        parent: Option<&str>,
        capabilities: &[&str],
        schema: Schema,
        methods: MethodSet,
    ) -> Result<TypeRef> {
        let parent = match parent {
            Some(parent) => self.lookup(parent).ok_or_else(|| ComposeError::DependencyMissing {
                kind: DependencyKind::Type,
                name: parent.to_string(),
            })?,
            None => self.root.clone(),
        };
        let capabilities = capabilities
            .iter()
            .map(|cap| {
                self.capability(cap).ok_or_else(|| ComposeError::DependencyMissing {
                    kind: DependencyKind::Capability,
                    name: cap.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self.create_from(name, &parent, capabilities, schema, methods))
    }

    /// Build and register a type from descriptors directly
    pub fn create_from(
        &self,
        name: &str,
        parent: &TypeRef,
        capabilities: Vec<CapabilityRef>,
        schema: Schema,
        methods: MethodSet,
    ) -> TypeRef {
        let ty = Rc::new(compose(name, parent, capabilities, schema, methods));
        let previous = self
            .types
            .borrow_mut()
            .insert(name.to_string(), ty.clone());
        if previous.is_some() {
            warn!(ty = name, "type redefined");
        }
        debug!(
            ty = name,
            parent = parent.name(),
            capabilities = ty.capabilities().len(),
            methods = ty.template().len(),
            "type created"
        );
        ty
    }

    // =========================================================================
    // Instantiation
    // =========================================================================

    /// Construct an instance of a registered type
    pub fn instantiate(&self, name: &str, config: &ValueMap) -> Result<Instance> {
        let ty = self.lookup(name).ok_or_else(|| ComposeError::DependencyMissing {
            kind: DependencyKind::Type,
            name: name.to_string(),
        })?;
        self.instantiate_type(&ty, config)
    }

    /// Construct an instance of a type descriptor
    pub fn instantiate_type(&self, ty: &TypeRef, config: &ValueMap) -> Result<Instance> {
        let policies = Policies {
            read_only_init: self.config.read_only_init,
            teardown: self.config.teardown,
        };
        let instance = Instance::allocate(ty.clone(), &self.registry, policies);
        composer::construct(&instance, config)?;
        Ok(instance)
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("types", &self.types.borrow().len())
            .field("capabilities", &self.capabilities.borrow().len())
            .field("registry", &self.registry)
            .finish()
    }
}

fn compose(
    name: &str,
    parent: &TypeRef,
    capabilities: Vec<CapabilityRef>,
    mut schema: Schema,
    methods: MethodSet,
) -> TypeDescriptor {
    let mut ty = TypeDescriptor::detached(name);
    extend(&mut ty, parent, &MethodTable::new());

    let mut borrowed = MethodTable::new();
    for capability in &capabilities {
        mix(&mut borrowed, capability.methods(), false, None);
        mix(&mut schema.attrs, &capability.schema().attrs, false, None);
        merge_statics(&mut schema.statics, &capability.schema().statics);
    }
    augment(&mut ty.template, &borrowed, true);
    augment(&mut ty.template, &methods.methods, true);

    ty.capabilities = capabilities;
    ty.schema = schema;
    ty.own = methods;
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{validators, AttributeDescriptor, Observable};
    use crate::class::ROOT_TYPE;
    use crate::events::handler;
    use crate::value::Value;
    use crate::value_map;
    use std::cell::RefCell;

    #[test]
    fn test_root_is_registered() {
        let factory = Factory::new();
        assert!(factory.lookup(ROOT_TYPE).is_some());
        assert!(factory.root().is_root());
        assert_eq!(factory.type_names(), vec![ROOT_TYPE.to_string()]);
    }

    #[test]
    fn test_missing_dependencies() {
        let factory = Factory::new();
        let err = factory
            .create("A", Some("Nope"), &[], Schema::new(), MethodSet::new())
            .unwrap_err();
        assert_eq!(
            err,
            ComposeError::DependencyMissing {
                kind: DependencyKind::Type,
                name: "Nope".into()
            }
        );

        let err = factory
            .create("A", None, &["Ghost"], Schema::new(), MethodSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::DependencyMissing { kind: DependencyKind::Capability, .. }
        ));
        assert!(factory.lookup("A").is_none());

        assert!(factory.instantiate("A", &ValueMap::new()).is_err());
    }

    #[test]
    fn test_earlier_capability_attr_wins() {
        let factory = Factory::new();
        factory
            .create(
                "Plain",
                None,
                &[],
                Schema::new().attr("x", AttributeDescriptor::new().value(1)),
                MethodSet::new(),
            )
            .unwrap();
        factory.register_capability(
            Capability::new("First").attr("y", AttributeDescriptor::new().value("first")),
        );
        factory.register_capability(
            Capability::new("Second").attr("y", AttributeDescriptor::new().value("second")),
        );
        factory
            .create("Mixed", Some("Plain"), &["First", "Second"], Schema::new(), MethodSet::new())
            .unwrap();

        let inst = factory.instantiate("Mixed", &ValueMap::new()).unwrap();
        assert_eq!(inst.get("y"), Some(Value::from("first")));
        assert_eq!(inst.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_explicit_schema_beats_capability() {
        let factory = Factory::new();
        factory.register_capability(
            Capability::new("Sized")
                .attr("size", AttributeDescriptor::new().value("medium"))
                .static_value("kind", "sized"),
        );
        let ty = factory
            .create(
                "Box",
                None,
                &["Sized"],
                Schema::new()
                    .attr("size", AttributeDescriptor::new().value("large"))
                    .static_value("kind", "box"),
                MethodSet::new(),
            )
            .unwrap();

        assert_eq!(ty.statics().get("kind"), Some(&Value::from("box")));
        let inst = factory.instantiate_type(&ty, &ValueMap::new()).unwrap();
        assert_eq!(inst.get("size"), Some(Value::from("large")));
    }

    #[test]
    fn test_method_resolution_order() {
        let factory = Factory::new();
        factory
            .create(
                "Parent",
                None,
                &[],
                Schema::new(),
                MethodSet::new()
                    .method("who", |_, _| Ok(Value::from("parent")))
                    .method("inherited", |_, _| Ok(Value::from("parent"))),
            )
            .unwrap();
        factory.register_capability(
            Capability::new("A")
                .method("who", |_, _| Ok(Value::from("a")))
                .method("shared", |_, _| Ok(Value::from("a"))),
        );
        factory.register_capability(
            Capability::new("B")
                .method("who", |_, _| Ok(Value::from("b")))
                .method("shared", |_, _| Ok(Value::from("b"))),
        );
        factory
            .create(
                "Child",
                Some("Parent"),
                &["A", "B"],
                Schema::new(),
                MethodSet::new().method("who", |_, _| Ok(Value::from("child"))),
            )
            .unwrap();

        let inst = factory.instantiate("Child", &ValueMap::new()).unwrap();
        assert_eq!(inst.call("who", &[]), Ok(Value::from("child")));
        assert_eq!(inst.call("shared", &[]), Ok(Value::from("a")));
        assert_eq!(inst.call("inherited", &[]), Ok(Value::from("parent")));
        assert!(matches!(
            inst.call("missing", &[]),
            Err(ComposeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_capabilities_stay_off_the_parent_chain() {
        let factory = Factory::new();
        factory.register_capability(Capability::new("Focusable"));
        factory
            .create("Widget", None, &["Focusable"], Schema::new(), MethodSet::new())
            .unwrap();
        factory
            .create("Button", Some("Widget"), &[], Schema::new(), MethodSet::new())
            .unwrap();

        let button = factory.instantiate("Button", &ValueMap::new()).unwrap();
        assert!(button.is_a("Widget"));
        assert!(!button.is_a("Focusable"));
        assert!(button.has_capability("Focusable"));
        let chain: Vec<_> = TypeDescriptor::ancestry(button.type_descriptor())
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(chain, vec!["Widget", "Button"]);
    }

    #[test]
    fn test_capability_constructor_and_events() {
        let factory = Factory::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        factory.register_capability(
            Capability::new("Counter")
                .attr("count", AttributeDescriptor::new().value(0))
                .constructor(|inst, cfg| {
                    let start = cfg.get("start").and_then(Value::as_int).unwrap_or(0);
                    inst.set("count", start)?;
                    Ok(())
                })
                .on(
                    "countChange",
                    handler(move |e| sink.borrow_mut().push(e.new_val())),
                ),
        );
        factory
            .create("Tally", None, &["Counter"], Schema::new(), MethodSet::new())
            .unwrap();

        let inst = factory
            .instantiate("Tally", &value_map! { "start" => 5 })
            .unwrap();
        assert_eq!(inst.get("count"), Some(Value::Int(5)));
        // Capability listeners are wired after its constructor runs
        assert!(seen.borrow().is_empty());
        inst.set("count", 6).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(Value::Int(6))]);
    }

    #[test]
    fn test_end_to_end_enabled_flag() {
        let factory = Factory::new();
        factory
            .create(
                "Toggle",
                None,
                &[],
                Schema::new().attr(
                    "enabled",
                    AttributeDescriptor::new().value(false).validator(validators::is_bool),
                ),
                MethodSet::new(),
            )
            .unwrap();
        let inst = factory.instantiate("Toggle", &ValueMap::new()).unwrap();
        assert_eq!(inst.get("enabled"), Some(Value::Bool(false)));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        inst.on(
            "enabledChange",
            handler(move |e| {
                sink.borrow_mut()
                    .push((e.new_val(), e.prev_val(), e.target().map(|t| t.guid().to_string())));
            }),
        );

        inst.set("enabled", true).unwrap();
        inst.set("enabled", "nope").unwrap();
        assert_eq!(inst.get("enabled"), Some(Value::Bool(true)));
        assert_eq!(
            *seen.borrow(),
            vec![(
                Some(Value::Bool(true)),
                Some(Value::Bool(false)),
                Some(inst.guid().to_string())
            )]
        );
    }

    #[test]
    fn test_guids_use_configured_prefix() {
        let factory = Factory::with_config(RuntimeConfig::default().with_id_prefix("app"));
        factory
            .create("Thing", None, &[], Schema::new(), MethodSet::new())
            .unwrap();
        let a = factory.instantiate("Thing", &ValueMap::new()).unwrap();
        let b = factory.instantiate("Thing", &ValueMap::new()).unwrap();
        assert!(b.id() > a.id());
        assert_eq!(a.guid(), format!("app_{}", a.id()));
        assert!(factory.registry().lookup(b.guid()).unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_redeclared_attr_overlays_parent_descriptor() {
        let factory = Factory::new();
        factory
            .create(
                "Parent",
                None,
                &[],
                Schema::new().attr(
                    "size",
                    AttributeDescriptor::new().value(1).validator(validators::is_integer),
                ),
                MethodSet::new(),
            )
            .unwrap();
        factory
            .create(
                "Child",
                Some("Parent"),
                &[],
                Schema::new().attr("size", AttributeDescriptor::new().value(2)),
                MethodSet::new(),
            )
            .unwrap();

        let inst = factory.instantiate("Child", &ValueMap::new()).unwrap();
        assert_eq!(inst.get("size"), Some(Value::Int(2)));
        inst.set("size", "huge").unwrap();
        assert_eq!(inst.get("size"), Some(Value::Int(2)));
    }
}
