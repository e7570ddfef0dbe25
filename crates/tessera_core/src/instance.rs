//! Live instances
//!
//! An [`Instance`] is a cheap handle (`Rc`) to one constructed object: its
//! type, its own [`EventTarget`] and [`AttributeStore`], the cleanup handles
//! it collected and its lifecycle state. Peers reference each other through
//! [`WeakInstance`] so that back references never keep an instance alive.
//!
//! Listeners registered on an instance should not capture the instance
//! itself; the facade's [`Event::target`](crate::events::Event::target)
//! hands it to them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::attribute::{AttributeStore, Observable};
use crate::class::TypeRef;
use crate::composer;
use crate::config::{ReadOnlyInit, TeardownPolicy};
use crate::error::{ComposeError, Result};
use crate::events::{Event, EventTarget, Handler, Subscription};
use crate::registry::Registry;
use crate::value::Value;

/// Where an instance is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructing,
    Ready,
    /// Construction failed part way; the instance is unusable
    Failed,
    Destroyed,
}

pub(crate) struct InstanceInner {
    id: u64,
    guid: String,
    ty: TypeRef,
    events: EventTarget,
    attrs: AttributeStore,
    cleanups: RefCell<Vec<Subscription>>,
    state: Cell<Lifecycle>,
    read_only_init: ReadOnlyInit,
    teardown: TeardownPolicy,
    registry: Weak<Registry>,
}

/// Policies copied onto every instance at creation
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Policies {
    pub read_only_init: ReadOnlyInit,
    pub teardown: TeardownPolicy,
}

/// Handle to a constructed object
#[derive(Clone)]
pub struct Instance(Rc<InstanceInner>);

/// Non-owning handle to an instance
#[derive(Clone, Default)]
pub struct WeakInstance(Weak<InstanceInner>);

impl Instance {
    /// Allocate an instance and register it; construction is the composer's job
    pub(crate) fn allocate(ty: TypeRef, registry: &Rc<Registry>, policies: Policies) -> Self {
        let (id, guid) = registry.issue();
        let instance = Instance(Rc::new(InstanceInner {
            id,
            guid,
            ty,
            events: EventTarget::new(),
            attrs: AttributeStore::new(),
            cleanups: RefCell::new(Vec::new()),
            state: Cell::new(Lifecycle::Constructing),
            read_only_init: policies.read_only_init,
            teardown: policies.teardown,
            registry: Rc::downgrade(registry),
        }));
        registry.register(&instance);
        trace!(guid = %instance.guid(), ty = instance.type_name(), "instance allocated");
        instance
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Registry-issued numeric id
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Registry-issued string key (`<prefix>_<id>`)
    pub fn guid(&self) -> &str {
        &self.0.guid
    }

    pub fn type_descriptor(&self) -> &TypeRef {
        &self.0.ty
    }

    pub fn type_name(&self) -> &str {
        self.0.ty.name()
    }

    /// Whether the instance's type is `name` or derives from it
    pub fn is_a(&self, name: &str) -> bool {
        self.0.ty.is_a(name)
    }

    /// Whether a capability named `name` is attached anywhere in the type chain
    pub fn has_capability(&self, name: &str) -> bool {
        self.0.ty.has_capability(name)
    }

    /// Invoke a method resolved through the type's template
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .0
            .ty
            .method(name)
            .cloned()
            .ok_or_else(|| ComposeError::UnknownMethod {
                type_name: self.type_name().to_string(),
                method: name.to_string(),
            })?;
        method(self, args)
    }

    /// Resolve an attribute holding a peer reference
    pub fn peer(&self, attr: &str) -> Option<Instance> {
        self.get(attr).and_then(|v| v.as_instance())
    }

    /// Collect a handle to detach when this instance is destroyed
    pub fn track(&self, subscription: Subscription) {
        self.0.cleanups.borrow_mut().push(subscription);
    }

    /// Listen on another host, detaching automatically on destroy
    pub fn listen_to<O: Observable>(
        &self,
        other: &O,
        event_type: &str,
        handler: Handler,
    ) -> Subscription {
        let subscription = other.on(event_type, handler);
        self.track(subscription.clone());
        subscription
    }

    /// Number of collected cleanup handles still attached
    pub fn tracked(&self) -> usize {
        self.0
            .cleanups
            .borrow()
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    /// Detach every collected cleanup handle
    pub(crate) fn detach_tracked(&self) -> usize {
        let handles = std::mem::take(&mut *self.0.cleanups.borrow_mut());
        handles.iter().filter(|s| s.detach()).count()
    }

    /// Tear the instance down
    ///
    /// Returns `Ok(false)` when a `destroy` listener cancelled or the instance
    /// was already destroyed.
    pub fn destroy(&self) -> Result<bool> {
        composer::teardown(self)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.0.state.get()
    }

    pub(crate) fn set_lifecycle(&self, state: Lifecycle) {
        self.0.state.set(state);
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.state.get() == Lifecycle::Destroyed
    }

    pub(crate) fn teardown_policy(&self) -> TeardownPolicy {
        self.0.teardown
    }

    pub(crate) fn registry(&self) -> Option<Rc<Registry>> {
        self.0.registry.upgrade()
    }
}

impl Observable for Instance {
    fn events(&self) -> &EventTarget {
        &self.0.events
    }

    fn attributes(&self) -> &AttributeStore {
        &self.0.attrs
    }

    fn event(&self, event_type: &str, primary: Value, extra: Vec<Value>) -> Event {
        Event::new(event_type, primary, extra).with_target(self.clone())
    }

    fn read_only_init(&self) -> ReadOnlyInit {
        self.0.read_only_init
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("guid", &self.0.guid)
            .field("type", &self.type_name())
            .field("state", &self.0.state.get())
            .finish()
    }
}

impl WeakInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(Instance)
    }

    pub fn ptr_eq(&self, other: &WeakInstance) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(inner) => write!(f, "WeakInstance({})", inner.guid),
            None => f.write_str("WeakInstance(<dropped>)"),
        }
    }
}
