//! Checkbox widget
//!
//! The Checkbox widget provides:
//! - A text label mirrored onto its node
//! - Checked state through the [`TOGGLEABLE`] capability
//! - Toggling refused while the widget is disabled
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tessera_core::{value_map, Observable, Value};
//! use tessera_widgets::checkbox::CHECKBOX;
//! use tessera_widgets::{RecordingSurface, WidgetContext};
//!
//! let ctx = WidgetContext::new(Rc::new(RecordingSurface::new()));
//! let cb = ctx.build(CHECKBOX, &value_map! { "label" => "Remember me" }).unwrap();
//!
//! cb.call("toggle", &[]).unwrap();
//! assert_eq!(cb.get("checked"), Some(Value::Bool(true)));
//! ```

use tessera_core::attribute::{validators, AttributeDescriptor, Observable};
use tessera_core::class::{Capability, MethodSet, Schema, TypeRef};
use tessera_core::events::handler;
use tessera_core::{Factory, Value};

use crate::context::WidgetServices;
use crate::widget::{flag, mirror};

/// Capability adding a boolean `checked` attribute and a `toggle` method
pub const TOGGLEABLE: &str = "Toggleable";
pub const CHECKBOX: &str = "Checkbox";

fn toggleable(services: &WidgetServices) -> Capability {
    let init_services = services.clone();
    let mirror_services = services.clone();
    Capability::new(TOGGLEABLE)
        .attr(
            "checked",
            AttributeDescriptor::new().value(false).validator(validators::is_bool),
        )
        .constructor(move |inst, _| {
            init_services.apply(inst, "checked", Value::Bool(flag(inst, "checked")));
            Ok(())
        })
        .on(
            "checkedChange",
            handler(|e| {
                if e.target().map(|t| flag(t, "disabled")).unwrap_or(false) {
                    e.prevent_default();
                }
            }),
        )
        .on(
            "afterCheckedChange",
            handler(move |e| {
                if let Some(target) = e.target() {
                    mirror_services.apply(target, "checked", e.new_val().unwrap_or_default());
                }
            }),
        )
        .method("toggle", |inst, _| {
            let next = !flag(inst, "checked");
            inst.write("checked", Value::Bool(next))?;
            Ok(Value::Bool(flag(inst, "checked")))
        })
}

pub(crate) fn register(factory: &Factory, services: &WidgetServices, widget: &TypeRef) -> TypeRef {
    let toggleable = factory.register_capability(toggleable(services));

    let schema = mirror(
        Schema::new().attr(
            "label",
            AttributeDescriptor::new().value("").validator(validators::is_string),
        ),
        services,
        "label",
    );

    let init_services = services.clone();
    let methods = MethodSet::new()
        .initializer(move |inst, _| {
            init_services.apply(inst, "label", inst.get("label").unwrap_or_default());
            Ok(())
        })
        .method("is_checked", |inst, _| Ok(Value::Bool(flag(inst, "checked"))));

    factory.create_from(CHECKBOX, widget, vec![toggleable], schema, methods)
}
