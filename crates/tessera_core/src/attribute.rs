//! Declarative, validated, observable attributes
//!
//! An attribute is declared with an [`AttributeDescriptor`] and stored per
//! host in an [`AttributeStore`]. Reads and writes go through the
//! [`Observable`] trait, which fires change events on the host's
//! [`EventTarget`]:
//!
//! ```text
//! set("enabled", true)
//!     ↓ locked?            → Err(AccessViolation)
//!     ↓ validator          → Rejected (silent veto)
//!     ↓ setter             → None vetoes, Some(v) transforms
//!     ↓ equal to current?  → Unchanged (no events)
//!     ↓ fire "enabledChange"        (cancelable, listeners may rewrite newVal)
//!     ↓ prevented?         → Cancelled (raw value untouched)
//!     ↓ commit raw value
//!     ↓ fire "afterEnabledChange"   (non-cancelable)
//! Committed
//! ```
//!
//! # Example
//!
//! ```
//! use tessera_core::attribute::{validators, AttributeDescriptor, AttributeHost, Observable};
//! use tessera_core::Value;
//!
//! let host = AttributeHost::new();
//! host.add_attr("enabled", AttributeDescriptor::new().value(false).validator(validators::is_bool))
//!     .unwrap();
//!
//! host.set("enabled", true).unwrap();
//! host.set("enabled", "nope").unwrap(); // vetoed by the validator
//! assert_eq!(host.get("enabled"), Some(Value::Bool(true)));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::ReadOnlyInit;
use crate::error::AttributeError;
use crate::events::{Event, EventTarget, Handler, ListenOptions, ListenerId, Subscription};
use crate::merge::{after_type, change_type};
use crate::value::{Value, ValueMap};

/// Predicate deciding whether a value may be written
pub type Validator = Rc<dyn Fn(&Value, &str) -> bool>;
/// Transform applied before storing; `None` vetoes the write
pub type Setter = Rc<dyn Fn(Value, &str) -> Option<Value>>;
/// Transform applied to the raw value on read
pub type Getter = Rc<dyn Fn(&Value, &str) -> Value>;
/// Lazily produces a default value
pub type ValueFactory = Rc<dyn Fn() -> Value>;

/// Declaration-ordered attribute descriptors keyed by name
pub type AttributeSchema = IndexMap<String, AttributeDescriptor>;

/// Default of an attribute: a value, or a factory called on first read
#[derive(Clone)]
pub enum InitialValue {
    Value(Value),
    Factory(ValueFactory),
}

impl InitialValue {
    fn produce(&self) -> Value {
        match self {
            InitialValue::Value(v) => v.clone(),
            InitialValue::Factory(f) => f(),
        }
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Declaration of one attribute
///
/// Every field is optional: a descriptor redeclared at a deeper level only
/// overrides the fields it sets (see [`AttributeDescriptor::overlay`]).
#[derive(Clone, Default)]
pub struct AttributeDescriptor {
    initial: Option<InitialValue>,
    read_only: Option<bool>,
    write_once: Option<bool>,
    required: Option<bool>,
    validator: Option<Validator>,
    setter: Option<Setter>,
    getter: Option<Getter>,
}

impl AttributeDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default value
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(InitialValue::Value(value.into()));
        self
    }

    /// Default computed on first read
    pub fn value_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.initial = Some(InitialValue::Factory(Rc::new(factory)));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    pub fn write_once(mut self) -> Self {
        self.write_once = Some(true);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &str) -> bool + 'static,
    {
        self.validator = Some(Rc::new(f));
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &str) -> Option<Value> + 'static,
    {
        self.setter = Some(Rc::new(f));
        self
    }

    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &str) -> Value + 'static,
    {
        self.getter = Some(Rc::new(f));
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    pub fn is_write_once(&self) -> bool {
        self.write_once.unwrap_or(false)
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn has_default(&self) -> bool {
        self.initial.is_some()
    }

    /// Produce the default value, calling the factory if there is one
    pub fn default_value(&self) -> Option<Value> {
        self.initial.as_ref().map(InitialValue::produce)
    }

    /// Override fields with the ones `other` sets
    pub fn overlay(&mut self, other: &AttributeDescriptor) {
        if other.initial.is_some() {
            self.initial = other.initial.clone();
        }
        if other.read_only.is_some() {
            self.read_only = other.read_only;
        }
        if other.write_once.is_some() {
            self.write_once = other.write_once;
        }
        if other.required.is_some() {
            self.required = other.required;
        }
        if other.validator.is_some() {
            self.validator = other.validator.clone();
        }
        if other.setter.is_some() {
            self.setter = other.setter.clone();
        }
        if other.getter.is_some() {
            self.getter = other.getter.clone();
        }
    }

    /// Reject conflicting flags
    pub fn check(&self, name: &str) -> Result<(), AttributeError> {
        if self.is_required() && self.is_read_only() {
            return Err(AttributeError::Configuration(name.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("has_default", &self.has_default())
            .field("read_only", &self.is_read_only())
            .field("write_once", &self.is_write_once())
            .field("required", &self.is_required())
            .field("validator", &self.validator.is_some())
            .field("setter", &self.setter.is_some())
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

/// Stock validators
pub mod validators {
    use crate::value::Value;

    pub fn is_bool(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Bool(_))
    }

    pub fn is_string(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Str(_))
    }

    pub fn is_number(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Int(_) | Value::Float(_))
    }

    pub fn is_integer(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Int(_))
    }

    pub fn is_map(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Map(_))
    }

    pub fn is_list(value: &Value, _name: &str) -> bool {
        matches!(value, Value::List(_))
    }

    pub fn is_handler(value: &Value, _name: &str) -> bool {
        matches!(value, Value::Handler(_))
    }
}

// =============================================================================
// STORE
// =============================================================================

struct Slot {
    descriptor: AttributeDescriptor,
    raw: Option<Value>,
    /// The raw value came from the default rather than a write
    seeded: bool,
    /// Read or written at least once (locks write-once attributes)
    consumed: bool,
}

/// Per-host attribute state: descriptors plus raw values
///
/// Descriptors are kept separate from raw values; defaults are seeded into
/// the raw slot lazily on first read.
#[derive(Default)]
pub struct AttributeStore {
    slots: RefCell<IndexMap<String, Slot>>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is declared
    pub fn contains(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    /// Declared names in declaration order
    pub fn names(&self) -> Vec<String> {
        self.slots.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Effective descriptor of a declared attribute
    pub fn descriptor(&self, name: &str) -> Option<AttributeDescriptor> {
        self.slots.borrow().get(name).map(|s| s.descriptor.clone())
    }

    /// Whether a written raw value exists (defaults do not count)
    pub fn is_set(&self, name: &str) -> bool {
        self.slots
            .borrow()
            .get(name)
            .map(|s| s.raw.is_some() && !s.seeded)
            .unwrap_or(false)
    }

    /// Whether writes through the public path are refused
    pub fn is_locked(&self, name: &str) -> bool {
        self.slots
            .borrow()
            .get(name)
            .map(|s| {
                s.descriptor.is_read_only() || (s.descriptor.is_write_once() && s.consumed)
            })
            .unwrap_or(false)
    }

    /// Drop the raw value so the next read re-seeds from the default
    pub fn unset(&self, name: &str) -> bool {
        match self.slots.borrow_mut().get_mut(name) {
            Some(slot) => {
                slot.seeded = false;
                slot.raw.take().is_some()
            }
            None => false,
        }
    }

    /// The declaration `descriptor` would produce, without storing it
    fn overlaid(&self, name: &str, descriptor: &AttributeDescriptor) -> AttributeDescriptor {
        let mut effective = self
            .slots
            .borrow()
            .get(name)
            .map(|s| s.descriptor.clone())
            .unwrap_or_default();
        effective.overlay(descriptor);
        effective
    }

    /// Store a checked declaration and its initial raw value
    fn install(&self, name: &str, descriptor: AttributeDescriptor, initial: Option<Value>) {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(name.to_string()).or_insert_with(|| Slot {
            descriptor: AttributeDescriptor::default(),
            raw: None,
            seeded: false,
            consumed: false,
        });
        slot.descriptor = descriptor;
        if let Some(value) = initial {
            slot.raw = Some(value);
            slot.seeded = false;
        }
    }

    fn has_raw(&self, name: &str) -> bool {
        self.slots
            .borrow()
            .get(name)
            .map(|s| s.raw.is_some())
            .unwrap_or(false)
    }

    /// Current raw value, seeding it from the default if absent
    fn seeded_raw(&self, name: &str) -> Option<Value> {
        let descriptor = {
            let slots = self.slots.borrow();
            let slot = slots.get(name)?;
            if let Some(raw) = &slot.raw {
                return Some(raw.clone());
            }
            slot.descriptor.clone()
        };
        // Factories run without the store borrowed
        let value = descriptor.default_value()?;
        if let Some(slot) = self.slots.borrow_mut().get_mut(name) {
            if slot.raw.is_none() {
                slot.raw = Some(value.clone());
                slot.seeded = true;
            }
        }
        Some(value)
    }

    fn commit(&self, name: &str, value: Value) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(name) {
            slot.raw = Some(value);
            slot.seeded = false;
        }
    }

    fn consume(&self, name: &str) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(name) {
            slot.consumed = true;
        }
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.borrow().keys()).finish()
    }
}

/// Result of one attribute write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored and `after<Name>Change` fired
    Committed,
    /// The transformed value equals the current one; nothing fired
    Unchanged,
    /// Vetoed by the validator or setter, or the attribute is undeclared
    Rejected,
    /// A `<name>Change` listener prevented the default action
    Cancelled,
}

impl WriteOutcome {
    pub fn is_committed(self) -> bool {
        self == WriteOutcome::Committed
    }
}

// =============================================================================
// OBSERVABLE
// =============================================================================

/// Split `"a.b.c"` into `("a", ["b", "c"])`
fn split_path(name: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = name.split('.');
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        None
    } else {
        Some((head, rest))
    }
}

/// Something owning an [`EventTarget`] and an [`AttributeStore`]
///
/// Carries the event bus surface and the attribute read/write algorithms as
/// provided methods. Implemented by [`AttributeHost`] and by
/// [`Instance`](crate::instance::Instance).
pub trait Observable {
    /// The host's listener table
    fn events(&self) -> &EventTarget;

    /// The host's attribute state
    fn attributes(&self) -> &AttributeStore;

    /// Build a cancelable event facade targeted at this host
    fn event(&self, event_type: &str, primary: Value, extra: Vec<Value>) -> Event {
        Event::new(event_type, primary, extra)
    }

    /// What to do with an initial value supplied for a read-only attribute
    fn read_only_init(&self) -> ReadOnlyInit {
        ReadOnlyInit::default()
    }

    // -------------------------------------------------------------------------
    // Event bus
    // -------------------------------------------------------------------------

    fn on(&self, event_type: &str, handler: Handler) -> Subscription {
        self.events().on(event_type, handler)
    }

    fn on_with(&self, event_type: &str, handler: Handler, options: ListenOptions) -> Subscription {
        self.events().on_with(event_type, handler, options)
    }

    fn once(&self, event_type: &str, handler: Handler) -> Subscription {
        self.events().once(event_type, handler)
    }

    fn after(&self, event_type: &str, handler: Handler) -> Subscription {
        self.events().after(event_type, handler)
    }

    fn detach(&self, id: ListenerId) -> bool {
        self.events().detach(id)
    }

    fn remove_listener(&self, event_type: Option<&str>, handler: Option<&Handler>) -> usize {
        self.events().remove_listener(event_type, handler)
    }

    /// Fire an event on this host; `true` unless a listener cancelled it
    fn fire(&self, event_type: &str, primary: Value, extra: Vec<Value>) -> bool {
        self.events().dispatch(&self.event(event_type, primary, extra))
    }

    // -------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------

    /// Declare an attribute
    fn add_attr(&self, name: &str, descriptor: AttributeDescriptor) -> Result<&Self, AttributeError>
    where
        Self: Sized,
    {
        self.add_attr_with(name, &descriptor, None)?;
        Ok(self)
    }

    /// Declare an attribute with an optional caller-supplied initial value
    ///
    /// The initial value passes through the validator and setter without
    /// firing events; an invalid one falls back to the default. Fails when
    /// the effective descriptor is both required and read-only, or when a
    /// required attribute ends up with no value.
    fn add_attr_with(
        &self,
        name: &str,
        descriptor: &AttributeDescriptor,
        initial: Option<Value>,
    ) -> Result<(), AttributeError> {
        descriptor.check(name)?;
        let store = self.attributes();
        let effective = store.overlaid(name, descriptor);
        effective.check(name)?;

        // Nothing is stored until every check has passed
        let mut value = None;
        if let Some(initial) = initial {
            if effective.is_read_only() {
                match self.read_only_init() {
                    ReadOnlyInit::Discard => {
                        warn!(attr = name, "initial value for read-only attribute discarded");
                    }
                    ReadOnlyInit::Reject => {
                        return Err(AttributeError::ReadOnlyInitialValue(name.to_string()));
                    }
                }
            } else {
                value = transform(&effective, name, initial);
            }
        }

        if effective.is_required()
            && value.is_none()
            && !store.has_raw(name)
            && !effective.has_default()
        {
            return Err(AttributeError::MissingRequired(name.to_string()));
        }
        store.install(name, effective, value);
        Ok(())
    }

    /// Declare every attribute of a schema, taking initial values from `values`
    fn add_attrs(&self, schema: &AttributeSchema, values: &ValueMap) -> Result<&Self, AttributeError>
    where
        Self: Sized,
    {
        for (name, descriptor) in schema {
            self.add_attr_with(name, descriptor, values.get(name).cloned())?;
        }
        Ok(self)
    }

    /// Read an attribute through its getter
    ///
    /// Returns `None` for undeclared attributes. Reading a write-once
    /// attribute locks it. Dotted names read into mapping values.
    fn get(&self, name: &str) -> Option<Value> {
        if let Some((head, path)) = split_path(name) {
            return self.get(head)?.get_path(&path).cloned();
        }
        let store = self.attributes();
        let descriptor = store.descriptor(name)?;
        if descriptor.is_read_only() || descriptor.is_write_once() {
            store.consume(name);
        }
        let raw = store.seeded_raw(name).unwrap_or_default();
        Some(match &descriptor.getter {
            Some(getter) => getter(&raw, name),
            None => raw,
        })
    }

    /// Snapshot of every declared attribute, read through [`Observable::get`]
    fn get_attrs(&self) -> ValueMap {
        self.attributes()
            .names()
            .into_iter()
            .filter_map(|name| self.get(&name).map(|v| (name, v)))
            .collect()
    }

    /// Whether a written raw value exists, ignoring defaults
    fn is_set(&self, name: &str) -> bool {
        self.attributes().is_set(name)
    }

    /// Drop the raw value; the next read re-seeds from the default
    fn unset(&self, name: &str) -> &Self
    where
        Self: Sized,
    {
        self.attributes().unset(name);
        self
    }

    /// Write an attribute, reporting what happened
    fn write(&self, name: &str, value: Value) -> Result<WriteOutcome, AttributeError> {
        write_attr(self, name, value, false)
    }

    /// Write an attribute, returning the host for chaining
    fn set(&self, name: &str, value: impl Into<Value>) -> Result<&Self, AttributeError>
    where
        Self: Sized,
    {
        self.write(name, value.into())?;
        Ok(self)
    }

    /// Write several attributes in mapping order, stopping at the first error
    fn set_all(&self, values: ValueMap) -> Result<&Self, AttributeError>
    where
        Self: Sized,
    {
        for (name, value) in values {
            self.write(&name, value)?;
        }
        Ok(self)
    }

    /// Write an attribute regardless of its read-only/write-once lock
    ///
    /// Validation, the setter and change events still apply. This is how a
    /// host updates state it exposes as read-only.
    fn set_internal(&self, name: &str, value: Value) -> WriteOutcome {
        // Only lock checks can fail, and they are skipped here
        write_attr(self, name, value, true).unwrap_or(WriteOutcome::Rejected)
    }
}

/// Run validator and setter; `None` means the value was vetoed
fn transform(descriptor: &AttributeDescriptor, name: &str, value: Value) -> Option<Value> {
    if let Some(validator) = &descriptor.validator {
        if !validator(&value, name) {
            debug!(attr = name, kind = value.kind(), "write rejected by validator");
            return None;
        }
    }
    match &descriptor.setter {
        Some(setter) => {
            let out = setter(value, name);
            if out.is_none() {
                debug!(attr = name, "write rejected by setter");
            }
            out
        }
        None => Some(value),
    }
}

fn write_attr<H: Observable + ?Sized>(
    host: &H,
    name: &str,
    value: Value,
    force: bool,
) -> Result<WriteOutcome, AttributeError> {
    let store = host.attributes();

    if let Some((head, path)) = split_path(name) {
        if !store.contains(head) {
            warn!(attr = name, "write to undeclared attribute ignored");
            return Ok(WriteOutcome::Rejected);
        }
        let mut whole = store.seeded_raw(head).unwrap_or_default();
        if !whole.set_path(&path, value) {
            debug!(attr = name, "sub-attribute path does not resolve");
            return Ok(WriteOutcome::Rejected);
        }
        return write_attr(host, head, whole, force);
    }

    let Some(descriptor) = store.descriptor(name) else {
        warn!(attr = name, "write to undeclared attribute ignored");
        return Ok(WriteOutcome::Rejected);
    };
    if !force && store.is_locked(name) {
        return Err(AttributeError::AccessViolation(name.to_string()));
    }

    let outcome = match transform(&descriptor, name, value) {
        None => WriteOutcome::Rejected,
        Some(new_val) => notify_and_commit(host, name, new_val),
    };

    if descriptor.is_write_once() {
        store.consume(name);
    }
    Ok(outcome)
}

fn notify_and_commit<H: Observable + ?Sized>(host: &H, name: &str, new_val: Value) -> WriteOutcome {
    let store = host.attributes();
    let prev_val = store.seeded_raw(name).unwrap_or_default();
    if new_val == prev_val {
        return WriteOutcome::Unchanged;
    }

    let mut payload = ValueMap::new();
    payload.insert("attrName".into(), Value::from(name));
    payload.insert("newVal".into(), new_val.clone());
    payload.insert("prevVal".into(), prev_val.clone());

    let change = host.event(
        &change_type(name),
        Value::Map(payload.clone()),
        vec![new_val.clone(), prev_val.clone()],
    );
    if !host.events().dispatch(&change) {
        debug!(attr = name, "change cancelled");
        return WriteOutcome::Cancelled;
    }

    // On-listeners may have rewritten the value being written
    let committed = change.new_val().unwrap_or(new_val);
    if committed == prev_val {
        debug!(attr = name, "change reverted by listener");
        return WriteOutcome::Unchanged;
    }
    store.commit(name, committed.clone());

    payload.insert("newVal".into(), committed.clone());
    let after = host
        .event(
            &after_type(&change_type(name)),
            Value::Map(payload),
            vec![committed, prev_val],
        )
        .non_cancelable();
    host.events().dispatch(&after);
    WriteOutcome::Committed
}

// =============================================================================
// STANDALONE HOST
// =============================================================================

/// An event bus and attribute store with no type behind them
#[derive(Default)]
pub struct AttributeHost {
    events: EventTarget,
    attributes: AttributeStore,
    read_only_init: ReadOnlyInit,
}

impl AttributeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose how initial values for read-only attributes are handled
    pub fn with_read_only_init(mut self, policy: ReadOnlyInit) -> Self {
        self.read_only_init = policy;
        self
    }
}

impl Observable for AttributeHost {
    fn events(&self) -> &EventTarget {
        &self.events
    }

    fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    fn read_only_init(&self) -> ReadOnlyInit {
        self.read_only_init
    }
}
