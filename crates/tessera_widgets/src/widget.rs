//! The base widget type
//!
//! Every stock widget derives from `Widget`, which owns one node on the
//! render surface for the instance's whole life:
//!
//! | Attribute  | Default | Notes                                   |
//! |------------|---------|-----------------------------------------|
//! | `visible`  | `true`  |                                         |
//! | `disabled` | `false` | disabling also blurs                    |
//! | `focused`  | `false` | read-only, changed by `focus` / `blur`  |
//! | `node`     | -       | read-only, the surface [`NodeId`]       |

use tessera_core::attribute::{validators, AttributeDescriptor, Observable};
use tessera_core::class::{MethodSet, Schema, TypeRef};
use tessera_core::events::handler;
use tessera_core::merge::{after_type, change_type};
use tessera_core::{Factory, Instance, Value};
use tracing::warn;

use crate::context::{NodeId, WidgetServices};

pub const WIDGET: &str = "Widget";

/// The surface node a widget instance renders into
pub fn node_of(instance: &Instance) -> Option<NodeId> {
    instance.get("node")?.downcast_ref::<NodeId>().copied()
}

pub(crate) fn flag(instance: &Instance, attr: &str) -> bool {
    instance
        .get(attr)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Forward an attribute's committed changes to the surface property of the same name
pub(crate) fn mirror(schema: Schema, services: &WidgetServices, attr: &str) -> Schema {
    let services = services.clone();
    let key = attr.to_string();
    schema.on(
        after_type(&change_type(attr)),
        handler(move |e| {
            if let Some(target) = e.target() {
                services.apply(target, &key, e.new_val().unwrap_or_default());
            }
        }),
    )
}

pub(crate) fn register(factory: &Factory, services: &WidgetServices) -> TypeRef {
    let mut schema = Schema::new()
        .attr(
            "visible",
            AttributeDescriptor::new().value(true).validator(validators::is_bool),
        )
        .attr(
            "disabled",
            AttributeDescriptor::new().value(false).validator(validators::is_bool),
        )
        .attr("focused", AttributeDescriptor::new().value(false).read_only())
        .attr("node", AttributeDescriptor::new().read_only());
    for attr in ["visible", "disabled", "focused"] {
        schema = mirror(schema, services, attr);
    }
    schema = schema.on(
        "afterDisabledChange",
        handler(|e| {
            if let Some(target) = e.target() {
                if flag(target, "disabled") && flag(target, "focused") {
                    target.set_internal("focused", Value::Bool(false));
                }
            }
        }),
    );

    let init_services = services.clone();
    let drop_services = services.clone();
    let methods = MethodSet::new()
        .initializer(move |inst, _| {
            let node = init_services
                .surface
                .create_node(&inst.type_name().to_lowercase());
            inst.set_internal("node", Value::object(node));
            init_services.apply(inst, "visible", Value::Bool(flag(inst, "visible")));
            init_services.apply(inst, "disabled", Value::Bool(flag(inst, "disabled")));
            Ok(())
        })
        .destructor(move |inst| {
            match node_of(inst) {
                Some(node) => {
                    drop_services.surface.remove_node(node);
                }
                None => warn!(guid = %inst.guid(), "widget destroyed without a node"),
            }
            Ok(())
        })
        .method("show", |inst, _| {
            inst.set("visible", true)?;
            Ok(Value::Null)
        })
        .method("hide", |inst, _| {
            inst.set("visible", false)?;
            Ok(Value::Null)
        })
        .method("focus", |inst, _| {
            if flag(inst, "disabled") {
                return Ok(Value::Bool(false));
            }
            inst.set_internal("focused", Value::Bool(true));
            Ok(Value::Bool(true))
        })
        .method("blur", |inst, _| {
            inst.set_internal("focused", Value::Bool(false));
            Ok(Value::Null)
        });

    factory.create_from(WIDGET, factory.root(), Vec::new(), schema, methods)
}
