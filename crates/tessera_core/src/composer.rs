//! Instance construction and teardown
//!
//! # Construction
//!
//! ```text
//! construct(instance, config)
//!     ↓ built-ins: "on" / "after" handler maps (wired), "initialized", "destroyed"
//!     ↓ for each level, root → leaf:
//!     │     register the level's attribute schema (config supplies initial values)
//!     │     wire the level's event schema
//!     │     for each capability: run its constructor, wire its event schema
//!     │     run the level's own initializer
//!     ↓ initialized = true
//! Ready
//! ```
//!
//! A failure at any step detaches the cleanup handles collected so far and
//! leaves the instance in [`Lifecycle::Failed`].
//!
//! # Teardown
//!
//! ```text
//! teardown(instance)
//!     ↓ fire "destroy"         (cancelable → Ok(false))
//!     ↓ destructors, leaf → root (see TeardownPolicy)
//!     ↓ detach collected cleanup handles
//!     ↓ destroyed = true
//!     ↓ clear own listeners, drop from the registry
//! Destroyed
//! ```

use tracing::{debug, trace, warn};

use crate::attribute::{validators, AttributeDescriptor, Observable};
use crate::class::{EventSchema, TypeDescriptor};
use crate::config::TeardownPolicy;
use crate::error::{ComposeError, Result};
use crate::events::Handler;
use crate::instance::{Instance, Lifecycle};
use crate::value::{Value, ValueMap};

/// Built-in attribute holding `{event type: handler}` wired with `on`
pub const ON_ATTR: &str = "on";
/// Built-in attribute holding `{event type: handler}` wired with `after`
pub const AFTER_ATTR: &str = "after";
/// Set to `true` once every level has initialized
pub const INITIALIZED_ATTR: &str = "initialized";
/// Set to `true` once teardown completes
pub const DESTROYED_ATTR: &str = "destroyed";
/// Cancelable event fired before teardown
pub const DESTROY_EVENT: &str = "destroy";

fn handler_map() -> AttributeDescriptor {
    AttributeDescriptor::new()
        .value_fn(|| Value::Map(ValueMap::new()))
        .validator(validators::is_map)
}

fn flag() -> AttributeDescriptor {
    AttributeDescriptor::new().value(false).read_only()
}

/// Run the construction algorithm on a freshly allocated instance
pub(crate) fn construct(instance: &Instance, config: &ValueMap) -> Result<()> {
    match run_levels(instance, config) {
        Ok(()) => {
            instance.set_lifecycle(Lifecycle::Ready);
            debug!(guid = %instance.guid(), ty = instance.type_name(), "instance constructed");
            Ok(())
        }
        Err(err) => {
            let detached = instance.detach_tracked();
            instance.events().clear();
            instance.set_lifecycle(Lifecycle::Failed);
            if let Some(registry) = instance.registry() {
                registry.forget(instance.guid());
            }
            warn!(
                guid = %instance.guid(),
                ty = instance.type_name(),
                detached,
                error = %err,
                "construction failed"
            );
            Err(err)
        }
    }
}

fn run_levels(instance: &Instance, config: &ValueMap) -> Result<()> {
    instance.add_attr_with(ON_ATTR, &handler_map(), config.get(ON_ATTR).cloned())?;
    instance.add_attr_with(AFTER_ATTR, &handler_map(), config.get(AFTER_ATTR).cloned())?;
    instance.add_attr_with(INITIALIZED_ATTR, &flag(), None)?;
    instance.add_attr_with(DESTROYED_ATTR, &flag(), None)?;
    wire_config_handlers(instance, ON_ATTR);
    wire_config_handlers(instance, AFTER_ATTR);

    for level in TypeDescriptor::ancestry(instance.type_descriptor()) {
        trace!(guid = %instance.guid(), level = level.name(), "initializing level");
        instance.add_attrs(&level.schema().attrs, config)?;
        wire_event_schema(instance, &level.schema().events);

        for capability in level.capabilities() {
            if let Some(init) = capability.initializer() {
                init(instance, config)?;
            }
            wire_event_schema(instance, &capability.schema().events);
        }

        if let Some(init) = &level.own_methods().initializer {
            init(instance, config)?;
        }
    }

    instance.set_internal(INITIALIZED_ATTR, Value::Bool(true));
    Ok(())
}

/// Subscribe the handlers found in the `on`/`after` built-in
fn wire_config_handlers(instance: &Instance, attr: &str) {
    let Some(Value::Map(map)) = instance.get(attr) else {
        return;
    };
    for (event_type, value) in &map {
        let handlers = handlers_in(value);
        if handlers.is_empty() {
            warn!(attr, event = %event_type, kind = value.kind(), "non-handler value ignored");
        }
        for handler in handlers {
            if attr == AFTER_ATTR {
                instance.after(event_type, handler);
            } else {
                instance.on(event_type, handler);
            }
        }
    }
}

fn handlers_in(value: &Value) -> Vec<Handler> {
    match value {
        Value::Handler(h) => vec![h.clone()],
        Value::List(items) => items.iter().filter_map(|v| v.as_handler().cloned()).collect(),
        _ => Vec::new(),
    }
}

fn wire_event_schema(instance: &Instance, events: &EventSchema) {
    for (event_type, handler) in events {
        instance.on(event_type, handler.clone());
    }
}

/// Run the teardown algorithm
pub(crate) fn teardown(instance: &Instance) -> Result<bool> {
    match instance.lifecycle() {
        Lifecycle::Destroyed | Lifecycle::Failed => return Ok(false),
        Lifecycle::Constructing | Lifecycle::Ready => {}
    }

    if !instance.fire(DESTROY_EVENT, Value::Null, Vec::new()) {
        debug!(guid = %instance.guid(), "destroy cancelled");
        return Ok(false);
    }

    let mut errors = Vec::new();
    for level in TypeDescriptor::ancestry(instance.type_descriptor()).iter().rev() {
        let Some(destructor) = &level.own_methods().destructor else {
            continue;
        };
        if let Err(err) = destructor(instance) {
            warn!(guid = %instance.guid(), level = level.name(), error = %err, "destructor failed");
            match instance.teardown_policy() {
                TeardownPolicy::Abort => return Err(err),
                TeardownPolicy::Isolate => errors.push(err),
            }
        }
    }

    let detached = instance.detach_tracked();
    instance.set_internal(DESTROYED_ATTR, Value::Bool(true));
    instance.events().clear();
    instance.set_lifecycle(Lifecycle::Destroyed);
    if let Some(registry) = instance.registry() {
        registry.forget(instance.guid());
    }
    debug!(guid = %instance.guid(), detached, "instance destroyed");

    if errors.is_empty() {
        Ok(true)
    } else {
        Err(ComposeError::Teardown {
            instance: instance.guid().to_string(),
            errors,
        })
    }
}
