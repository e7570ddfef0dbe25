//! Cancelable publish/subscribe core
//!
//! Every instance owns one [`EventTarget`]: a table of named listeners
//! dispatched synchronously in registration order.
//!
//! # Architecture
//!
//! ```text
//! EventTarget::on("clickChange", handler)
//!     ↓ Registration stored in a SlotMap (generational ListenerId)
//!     ↓ id appended to the per-type list
//! EventTarget::dispatch(&Event)
//!     ↓ cursor walks the per-type list, skipping ids that no longer resolve
//! handler(&Event)  ──  may on()/detach()/fire() on the same target
//!     ↓
//! true unless a listener called prevent_default()
//! ```
//!
//! Listeners can add or remove listeners for the event currently being
//! dispatched. Removal only drops the registration from the slot map; the
//! per-type id list is compacted once the outermost dispatch finishes, so the
//! cursor never shifts and a removed entry can never fire. Listeners appended
//! mid-dispatch are reached by the same cursor.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tessera_core::events::{handler, EventTarget};
//! use tessera_core::Value;
//!
//! let bus = EventTarget::new();
//! let hits = Rc::new(Cell::new(0));
//! let counter = hits.clone();
//! bus.on("ping", handler(move |_| counter.set(counter.get() + 1)));
//!
//! assert!(bus.fire("ping", Value::Null, Vec::new()));
//! assert_eq!(hits.get(), 1);
//! ```

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::instance::Instance;
use crate::merge::after_type;
use crate::value::{Value, ValueMap};

new_key_type! {
    /// Unique identifier for a listener registration
    pub struct ListenerId;
}

/// Callback invoked for each dispatch of a subscribed event
///
/// Uses Rc since the runtime is single-threaded.
pub type Handler = Rc<dyn Fn(&Event)>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) + 'static,
{
    Rc::new(f)
}

/// Extra per-registration data: a context value and bound leading args
#[derive(Clone, Default, Debug)]
pub struct ListenOptions {
    pub context: Option<Value>,
    pub bound: Vec<Value>,
    pub once: bool,
}

impl ListenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn bind(mut self, arg: impl Into<Value>) -> Self {
        self.bound.push(arg.into());
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

// =============================================================================
// FACADE
// =============================================================================

/// The per-dispatch event object passed to listeners
///
/// Fields of a mapping primary argument are shallow-merged into the facade
/// and readable through [`Event::get`]. The facade is shared by every
/// listener of one dispatch, so a listener may rewrite a field for the ones
/// that follow (and for the code that fired the event).
pub struct Event {
    event_type: String,
    target: Option<Instance>,
    primary: Value,
    details: RefCell<ValueMap>,
    extra: Vec<Value>,
    cancelable: bool,
    prevented: Cell<bool>,
    /// Context of the listener currently being invoked
    context: RefCell<Option<Value>>,
    /// Bound args of the listener currently being invoked
    bound: RefCell<SmallVec<[Value; 2]>>,
}

impl Event {
    /// Create a cancelable event facade
    pub fn new(event_type: impl Into<String>, primary: Value, extra: Vec<Value>) -> Self {
        let details = match &primary {
            Value::Map(map) => map.clone(),
            _ => ValueMap::new(),
        };
        Self {
            event_type: event_type.into(),
            target: None,
            primary,
            details: RefCell::new(details),
            extra,
            cancelable: true,
            prevented: Cell::new(false),
            context: RefCell::new(None),
            bound: RefCell::new(SmallVec::new()),
        }
    }

    /// Set the instance the event is fired on
    pub fn with_target(mut self, target: Instance) -> Self {
        self.target = Some(target);
        self
    }

    /// Make `prevent_default` a no-op for this dispatch
    pub fn non_cancelable(mut self) -> Self {
        self.cancelable = false;
        self
    }

    /// The event type name
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The instance the event was fired on, if any
    pub fn target(&self) -> Option<&Instance> {
        self.target.as_ref()
    }

    /// The primary argument as passed to `fire`
    pub fn primary(&self) -> &Value {
        &self.primary
    }

    /// Read a facade field
    pub fn get(&self, key: &str) -> Option<Value> {
        self.details.borrow().get(key).cloned()
    }

    /// Rewrite a facade field for later listeners and the firing code
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.details.borrow_mut().insert(key.into(), value.into());
    }

    /// Borrow every facade field
    pub fn details(&self) -> Ref<'_, ValueMap> {
        self.details.borrow()
    }

    /// Arguments passed after the primary argument
    pub fn args(&self) -> &[Value] {
        &self.extra
    }

    /// One argument passed after the primary argument
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.extra.get(index)
    }

    /// Leading args bound at registration for the listener being invoked
    pub fn bound(&self) -> Ref<'_, [Value]> {
        Ref::map(self.bound.borrow(), |b| b.as_slice())
    }

    /// Context value given at registration for the listener being invoked
    pub fn context(&self) -> Option<Value> {
        self.context.borrow().clone()
    }

    /// New value of an attribute change event
    pub fn new_val(&self) -> Option<Value> {
        self.get("newVal")
    }

    /// Previous value of an attribute change event
    pub fn prev_val(&self) -> Option<Value> {
        self.get("prevVal")
    }

    /// Attribute name of an attribute change event
    pub fn attr_name(&self) -> Option<String> {
        self.get("attrName")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Cancel the default action tied to this dispatch
    ///
    /// Listeners already scheduled still run.
    pub fn prevent_default(&self) {
        if self.cancelable {
            self.prevented.set(true);
        } else {
            trace!(event = %self.event_type, "prevent_default on non-cancelable event ignored");
        }
    }

    /// Alias of [`Event::prevent_default`]
    pub fn halt(&self) {
        self.prevent_default();
    }

    /// Whether some listener cancelled this dispatch
    pub fn is_prevented(&self) -> bool {
        self.prevented.get()
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    fn enter_listener(&self, registration: &Registration) {
        *self.context.borrow_mut() = registration.context.clone();
        *self.bound.borrow_mut() = registration.bound.clone();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("details", &self.details.borrow())
            .field("extra", &self.extra)
            .field("prevented", &self.prevented.get())
            .finish()
    }
}

// =============================================================================
// LISTENER TABLE
// =============================================================================

#[derive(Clone)]
struct Registration {
    event_type: String,
    handler: Handler,
    context: Option<Value>,
    bound: SmallVec<[Value; 2]>,
    once: bool,
}

#[derive(Default)]
struct ListenerTable {
    registrations: SlotMap<ListenerId, Registration>,
    by_type: FxHashMap<String, SmallVec<[ListenerId; 4]>>,
    /// Nesting depth of dispatches in progress (> 0 defers compaction)
    dispatching: u32,
}

impl ListenerTable {
    fn remove(&mut self, id: ListenerId) -> bool {
        let removed = self.registrations.remove(id).is_some();
        if removed && self.dispatching == 0 {
            self.compact();
        }
        removed
    }

    /// Drop ids that no longer resolve and empty per-type lists
    fn compact(&mut self) {
        let registrations = &self.registrations;
        self.by_type.retain(|_, ids| {
            ids.retain(|id| registrations.contains_key(*id));
            !ids.is_empty()
        });
    }

    /// Next live registration for `event_type` at or after `cursor`
    fn next_live(&self, event_type: &str, cursor: &mut usize) -> Option<(ListenerId, Registration)> {
        let ids = self.by_type.get(event_type)?;
        while *cursor < ids.len() {
            let id = ids[*cursor];
            *cursor += 1;
            if let Some(reg) = self.registrations.get(id) {
                return Some((id, reg.clone()));
            }
        }
        None
    }
}

/// Handle to one listener registration
///
/// Holds a weak reference to the listener table, so keeping a subscription
/// around never keeps its target alive.
#[derive(Clone)]
pub struct Subscription {
    id: ListenerId,
    event_type: String,
    table: Weak<RefCell<ListenerTable>>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Whether the registration still exists
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .map(|t| t.borrow().registrations.contains_key(self.id))
            .unwrap_or(false)
    }

    /// Remove the registration; returns `false` if it was already gone
    pub fn detach(&self) -> bool {
        match self.table.upgrade() {
            Some(table) => table.borrow_mut().remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .finish()
    }
}

// =============================================================================
// EVENT TARGET
// =============================================================================

/// Per-instance registry of named listeners
#[derive(Clone, Default)]
pub struct EventTarget {
    table: Rc<RefCell<ListenerTable>>,
}

impl EventTarget {
    /// Create an empty listener table
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event type
    pub fn on(&self, event_type: &str, handler: Handler) -> Subscription {
        self.on_with(event_type, handler, ListenOptions::default())
    }

    /// Subscribe with a context value, bound args or once semantics
    pub fn on_with(&self, event_type: &str, handler: Handler, options: ListenOptions) -> Subscription {
        let mut table = self.table.borrow_mut();
        let id = table.registrations.insert(Registration {
            event_type: event_type.to_string(),
            handler,
            context: options.context,
            bound: options.bound.into_iter().collect(),
            once: options.once,
        });
        table
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .push(id);
        Subscription {
            id,
            event_type: event_type.to_string(),
            table: Rc::downgrade(&self.table),
        }
    }

    /// Subscribe for a single dispatch
    pub fn once(&self, event_type: &str, handler: Handler) -> Subscription {
        self.on_with(event_type, handler, ListenOptions::default().once())
    }

    /// Subscribe to the after-notification of an event type
    ///
    /// `after("valueChange", f)` is `on("afterValueChange", f)`.
    pub fn after(&self, event_type: &str, handler: Handler) -> Subscription {
        self.on(&after_type(event_type), handler)
    }

    /// Remove one registration by id
    pub fn detach(&self, id: ListenerId) -> bool {
        self.table.borrow_mut().remove(id)
    }

    /// Remove matching registrations, returning how many were removed
    ///
    /// - no type, no handler: everything
    /// - type only: every listener of that type
    /// - handler given: only registrations of that handler (by identity)
    pub fn remove_listener(&self, event_type: Option<&str>, handler: Option<&Handler>) -> usize {
        let mut table = self.table.borrow_mut();
        let doomed: Vec<ListenerId> = table
            .registrations
            .iter()
            .filter(|(_, reg)| event_type.map_or(true, |t| reg.event_type == t))
            .filter(|(_, reg)| handler.map_or(true, |h| Rc::ptr_eq(&reg.handler, h)))
            .map(|(id, _)| id)
            .collect();
        for id in &doomed {
            table.registrations.remove(*id);
        }
        if table.dispatching == 0 {
            table.compact();
        }
        doomed.len()
    }

    /// Remove every registration
    pub fn clear(&self) {
        self.remove_listener(None, None);
    }

    /// Whether any listener is registered for `event_type`
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listener_count(event_type) > 0
    }

    /// Number of live listeners for `event_type`
    pub fn listener_count(&self, event_type: &str) -> usize {
        let table = self.table.borrow();
        table
            .by_type
            .get(event_type)
            .map(|ids| {
                ids.iter()
                    .filter(|id| table.registrations.contains_key(**id))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Total number of live registrations
    pub fn len(&self) -> usize {
        self.table.borrow().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire an event with no target
    ///
    /// Returns `true` unless a listener called `prevent_default`.
    pub fn fire(&self, event_type: &str, primary: Value, extra: Vec<Value>) -> bool {
        self.dispatch(&Event::new(event_type, primary, extra))
    }

    /// Invoke listeners for `event.event_type()` in registration order
    ///
    /// Returns `true` unless a listener called `prevent_default`.
    pub fn dispatch(&self, event: &Event) -> bool {
        let event_type = event.event_type();
        if !self.table.borrow().by_type.contains_key(event_type) {
            return true;
        }

        self.table.borrow_mut().dispatching += 1;
        let mut cursor = 0;
        let mut invoked = 0usize;
        loop {
            let next = self.table.borrow().next_live(event_type, &mut cursor);
            let Some((id, registration)) = next else {
                break;
            };
            // Dropped before the call so a nested fire cannot reach it again
            if registration.once {
                self.table.borrow_mut().registrations.remove(id);
            }
            event.enter_listener(&registration);
            (registration.handler)(event);
            invoked += 1;
        }

        {
            let mut table = self.table.borrow_mut();
            table.dispatching -= 1;
            if table.dispatching == 0 {
                table.compact();
            }
        }

        trace!(event = %event_type, listeners = invoked, "dispatched");
        if event.is_prevented() {
            debug!(event = %event_type, "default action prevented");
        }
        !event.is_prevented()
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_map;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &str| {
            let sink = sink.clone();
            let label = label.to_string();
            handler(move |_| sink.borrow_mut().push(label.clone()))
        };
        (log, make)
    }

    #[test]
    fn test_registration_order() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        bus.on("tick", make("L1"));
        bus.on("tick", make("L2"));
        bus.on("tick", make("L3"));

        assert!(bus.fire("tick", Value::Null, Vec::new()));
        assert_eq!(*log.borrow(), vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn test_fire_without_listeners() {
        let bus = EventTarget::new();
        assert!(bus.fire("nothing", Value::Null, Vec::new()));
    }

    #[test]
    fn test_once_fires_exactly_once() {
        let bus = EventTarget::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        bus.once("tick", handler(move |_| counter.set(counter.get() + 1)));

        for _ in 0..5 {
            bus.fire("tick", Value::Null, Vec::new());
        }
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[test]
    fn test_once_with_reentrant_fire() {
        let bus = EventTarget::new();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let inner = bus.clone();
        bus.once(
            "tick",
            handler(move |_| {
                counter.set(counter.get() + 1);
                inner.fire("tick", Value::Null, Vec::new());
            }),
        );

        bus.fire("tick", Value::Null, Vec::new());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_nested_fire_completes_before_outer_resumes() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        let inner = bus.clone();
        let sink = log.clone();
        bus.on(
            "outer",
            handler(move |_| {
                sink.borrow_mut().push("o1".to_string());
                inner.fire("inner", Value::Null, Vec::new());
                sink.borrow_mut().push("o1-end".to_string());
            }),
        );
        bus.on("outer", make("o2"));
        bus.on("inner", make("i1"));

        bus.fire("outer", Value::Null, Vec::new());
        assert_eq!(*log.borrow(), vec!["o1", "i1", "o1-end", "o2"]);
    }

    #[test]
    fn test_prevent_default() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        bus.on("save", handler(|e| e.prevent_default()));
        bus.on("save", make("after-cancel"));

        assert!(!bus.fire("save", Value::Null, Vec::new()));
        // Sibling listeners still run
        assert_eq!(*log.borrow(), vec!["after-cancel"]);
    }

    #[test]
    fn test_non_cancelable_ignores_prevent_default() {
        let bus = EventTarget::new();
        bus.on("done", handler(|e| e.halt()));
        let event = Event::new("done", Value::Null, Vec::new()).non_cancelable();
        assert!(bus.dispatch(&event));
    }

    #[test]
    fn test_facade_merges_mapping_primary() {
        let bus = EventTarget::new();
        let seen = Rc::new(RefCell::new(None));
        let slot = seen.clone();
        bus.on(
            "move",
            handler(move |e| {
                *slot.borrow_mut() = Some((e.get("x"), e.arg(0).cloned(), e.event_type().to_string()));
            }),
        );

        bus.fire("move", Value::from(value_map! { "x" => 4 }), vec![Value::from("extra")]);
        let (x, extra, ty) = seen.borrow_mut().take().unwrap();
        assert_eq!(x, Some(Value::Int(4)));
        assert_eq!(extra, Some(Value::from("extra")));
        assert_eq!(ty, "move");
    }

    #[test]
    fn test_bound_args_and_context() {
        let bus = EventTarget::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let slot = seen.clone();
        bus.on_with(
            "ping",
            handler(move |e| {
                slot.borrow_mut().push((e.bound().to_vec(), e.context()));
            }),
            ListenOptions::new().context("ctx").bind(1).bind(2),
        );
        let plain = seen.clone();
        bus.on("ping", handler(move |e| plain.borrow_mut().push((e.bound().to_vec(), e.context()))));

        bus.fire("ping", Value::Null, Vec::new());
        let seen = seen.borrow();
        assert_eq!(seen[0].0, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(seen[0].1, Some(Value::from("ctx")));
        assert!(seen[1].0.is_empty());
        assert_eq!(seen[1].1, None);
    }

    #[test]
    fn test_remove_listener_variants() {
        let bus = EventTarget::new();
        let (_, make) = recorder();
        let shared = make("shared");
        bus.on("a", shared.clone());
        bus.on("b", shared.clone());
        bus.on("a", make("other"));
        bus.on("c", make("c"));

        assert_eq!(bus.remove_listener(None, Some(&shared)), 2);
        assert_eq!(bus.listener_count("a"), 1);
        assert_eq!(bus.remove_listener(Some("a"), None), 1);
        assert!(!bus.has_listeners("a"));
        assert_eq!(bus.remove_listener(None, None), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_remove_during_dispatch_skips_pending_listener() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        let later: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot = later.clone();
        bus.on(
            "tick",
            handler(move |_| {
                if let Some(sub) = slot.borrow().as_ref() {
                    sub.detach();
                }
            }),
        );
        *later.borrow_mut() = Some(bus.on("tick", make("removed")));
        bus.on("tick", make("kept"));

        bus.fire("tick", Value::Null, Vec::new());
        assert_eq!(*log.borrow(), vec!["kept"]);
        assert_eq!(bus.listener_count("tick"), 2);
    }

    #[test]
    fn test_self_removal_does_not_skip_next() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        let own: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot = own.clone();
        let sink = log.clone();
        *own.borrow_mut() = Some(bus.on(
            "tick",
            handler(move |_| {
                sink.borrow_mut().push("self".to_string());
                if let Some(sub) = slot.borrow().as_ref() {
                    sub.detach();
                }
            }),
        ));
        bus.on("tick", make("next"));

        bus.fire("tick", Value::Null, Vec::new());
        bus.fire("tick", Value::Null, Vec::new());
        assert_eq!(*log.borrow(), vec!["self", "next", "next"]);
    }

    #[test]
    fn test_listener_added_during_dispatch_runs() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        let inner = bus.clone();
        let added = Rc::new(Cell::new(false));
        let flag = added.clone();
        let late = make("late");
        bus.on(
            "tick",
            handler(move |_| {
                if !flag.replace(true) {
                    inner.on("tick", late.clone());
                }
            }),
        );

        bus.fire("tick", Value::Null, Vec::new());
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn test_after_sugar() {
        let bus = EventTarget::new();
        let (log, make) = recorder();
        bus.after("valueChange", make("after"));
        assert!(bus.has_listeners("afterValueChange"));
        bus.fire("afterValueChange", Value::Null, Vec::new());
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn test_subscription_outlives_target() {
        let sub = {
            let bus = EventTarget::new();
            bus.on("x", handler(|_| {}))
        };
        assert!(!sub.is_active());
        assert!(!sub.detach());
    }
}
