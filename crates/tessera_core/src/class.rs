//! Type descriptors and capabilities
//!
//! A [`TypeDescriptor`] is one level of a single-parent chain. Each level
//! carries its own declared schema and method set; schemas are never
//! flattened across levels, the composer walks [`TypeDescriptor::ancestry`]
//! at construction time instead. Method lookup goes through the flat
//! [`MethodTemplate`] built by the factory.
//!
//! A [`Capability`] is a reusable behavior attached alongside a level. Its
//! methods are copied onto the type's template and its schema is merged into
//! the level's schema, but it never joins the parent chain.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::attribute::{AttributeDescriptor, AttributeSchema};
use crate::error::Result;
use crate::events::Handler;
use crate::instance::Instance;
use crate::merge::{MethodTable, MethodTemplate};
use crate::value::{Value, ValueMap};

/// Name of the implicit root type every chain ends in
pub const ROOT_TYPE: &str = "Base";

/// An instance method
pub type Method = Rc<dyn Fn(&Instance, &[Value]) -> Result<Value>>;

/// Level-local (or capability) initializer, called with the construction config
pub type Initializer = Rc<dyn Fn(&Instance, &ValueMap) -> Result<()>>;

/// Level-local destructor
pub type Destructor = Rc<dyn Fn(&Instance) -> Result<()>>;

/// Declared event handlers keyed by event type
pub type EventSchema = IndexMap<String, Handler>;

pub type TypeRef = Rc<TypeDescriptor>;
pub type CapabilityRef = Rc<Capability>;

/// Wrap a closure as a [`Method`]
pub fn method<F>(f: F) -> Method
where
    F: Fn(&Instance, &[Value]) -> Result<Value> + 'static,
{
    Rc::new(f)
}

// =============================================================================
// SCHEMA / METHODS
// =============================================================================

/// What a level declares: attributes, event handlers and statics
#[derive(Clone, Default)]
pub struct Schema {
    pub attrs: AttributeSchema,
    pub events: EventSchema,
    pub statics: ValueMap,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.attrs.insert(name.into(), descriptor);
        self
    }

    pub fn on(mut self, event_type: impl Into<String>, handler: Handler) -> Self {
        self.events.insert(event_type.into(), handler);
        self
    }

    pub fn static_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.statics.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("attrs", &self.attrs.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("statics", &self.statics)
            .finish()
    }
}

/// Methods a level defines itself
///
/// `initializer` and `destructor` are level-local: they are never inherited
/// through the template, the composer calls each level's own.
#[derive(Clone, Default)]
pub struct MethodSet {
    pub initializer: Option<Initializer>,
    pub destructor: Option<Destructor>,
    pub methods: MethodTable,
}

impl MethodSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance, &ValueMap) -> Result<()> + 'static,
    {
        self.initializer = Some(Rc::new(f));
        self
    }

    pub fn destructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) -> Result<()> + 'static,
    {
        self.destructor = Some(Rc::new(f));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value> + 'static,
    {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSet")
            .field("initializer", &self.initializer.is_some())
            .field("destructor", &self.destructor.is_some())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// CAPABILITY
// =============================================================================

/// A reusable behavior attached alongside a type's ancestry
#[derive(Clone)]
pub struct Capability {
    name: String,
    constructor: Option<Initializer>,
    methods: MethodTable,
    schema: Schema,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            methods: MethodTable::new(),
            schema: Schema::default(),
        }
    }

    /// Side-effecting initializer run during construction of every host
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance, &ValueMap) -> Result<()> + 'static,
    {
        self.constructor = Some(Rc::new(f));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value> + 'static,
    {
        self.methods.insert(name.into(), Rc::new(f));
        self
    }

    pub fn attr(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.schema.attrs.insert(name.into(), descriptor);
        self
    }

    pub fn on(mut self, event_type: impl Into<String>, handler: Handler) -> Self {
        self.schema.events.insert(event_type.into(), handler);
        self
    }

    pub fn static_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.schema.statics.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.constructor.as_ref()
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("schema", &self.schema)
            .finish()
    }
}

// =============================================================================
// TYPE DESCRIPTOR
// =============================================================================

/// One level of a single-parent type chain
pub struct TypeDescriptor {
    pub(crate) name: String,
    pub(crate) parent: Option<TypeRef>,
    pub(crate) capabilities: Vec<CapabilityRef>,
    pub(crate) own: MethodSet,
    pub(crate) template: MethodTemplate,
    pub(crate) schema: Schema,
}

impl TypeDescriptor {
    /// The root type: no parent, no schema, no methods
    pub(crate) fn root() -> Self {
        Self::detached(ROOT_TYPE)
    }

    /// A descriptor not yet linked to a parent
    pub(crate) fn detached(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            template: MethodTemplate::new(name.clone()),
            name,
            parent: None,
            capabilities: Vec::new(),
            own: MethodSet::default(),
            schema: Schema::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The superclass, `None` only for the root
    pub fn parent(&self) -> Option<&TypeRef> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Capabilities attached at this level, in declaration order
    pub fn capabilities(&self) -> &[CapabilityRef] {
        &self.capabilities
    }

    /// Methods declared by this level itself
    pub fn own_methods(&self) -> &MethodSet {
        &self.own
    }

    /// This level's declared schema, with capability schemas merged in
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn statics(&self) -> &ValueMap {
        &self.schema.statics
    }

    pub fn template(&self) -> &MethodTemplate {
        &self.template
    }

    /// Resolve a method through the flat template
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.template.get(name)
    }

    /// Levels from the topmost non-root ancestor down to `this`
    pub fn ancestry(this: &TypeRef) -> Vec<TypeRef> {
        let mut levels = Vec::new();
        let mut current = Some(this.clone());
        while let Some(level) = current {
            if level.is_root() {
                break;
            }
            current = level.parent.clone();
            levels.push(level);
        }
        levels.reverse();
        levels
    }

    /// Whether `name` is this type or one of its ancestors (root included)
    pub fn is_a(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        self.parent.as_ref().map(|p| p.is_a(name)).unwrap_or(false)
    }

    /// Whether a capability named `name` is attached anywhere in the chain
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
            || self
                .parent
                .as_ref()
                .map(|p| p.has_capability(name))
                .unwrap_or(false)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field(
                "capabilities",
                &self.capabilities.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("methods", &self.template.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
