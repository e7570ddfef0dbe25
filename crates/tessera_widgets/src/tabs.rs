//! Tab view and tabs
//!
//! A `TabView` holds `Tab`s through two capabilities:
//!
//! - [`TAB_PARENT`]: `children` (list of weak refs) and `selection`, plus the
//!   `add` / `remove` / `select` / `item` / `size` methods
//! - [`TAB_CHILD`]: a weak `parent` back reference and `selected`
//!
//! The view listens to each child's `afterSelectedChange` through
//! [`Instance::listen_to`], so the subscriptions are detached when the view
//! is destroyed. Selecting one tab deselects the previous one.

use tessera_core::attribute::{validators, AttributeDescriptor, Observable};
use tessera_core::class::{Capability, MethodSet, Schema, TypeRef};
use tessera_core::events::handler;
use tessera_core::{ComposeError, Factory, Instance, Result, Value};
use tracing::{debug, warn};

use crate::context::WidgetServices;
use crate::widget::{flag, mirror, node_of};

pub const TAB_PARENT: &str = "TabParent";
pub const TAB_CHILD: &str = "TabChild";
pub const TAB_VIEW: &str = "TabView";
pub const TAB: &str = "Tab";

/// Live children of a parent, in insertion order
pub fn children(view: &Instance) -> Vec<Instance> {
    view.get("children")
        .and_then(|v| v.as_list().map(|items| items.to_vec()))
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_instance)
        .collect()
}

fn instance_arg(args: &[Value], method: &str) -> Result<Instance> {
    args.first()
        .and_then(Value::as_instance)
        .ok_or_else(|| ComposeError::failed(format!("{method} expects a live instance")))
}

fn index_arg(args: &[Value], method: &str) -> Result<usize> {
    args.first()
        .and_then(Value::as_int)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| ComposeError::failed(format!("{method} expects a non-negative index")))
}

fn store_children(view: &Instance, tabs: &[Instance]) {
    view.set_internal(
        "children",
        Value::List(tabs.iter().map(Value::from).collect()),
    );
}

/// Keep the parent's selection in step with a child's `selected` flag
fn sync_selection(view: &Instance, tab: &Instance, selected: bool) {
    let current = view.peer("selection");
    if selected {
        if current.as_ref().map(|c| c.ptr_eq(tab)).unwrap_or(false) {
            return;
        }
        view.set_internal("selection", Value::from(tab));
        if let Some(previous) = current {
            if let Err(err) = previous.write("selected", Value::Bool(false)) {
                warn!(guid = %previous.guid(), error = %err, "could not deselect tab");
            }
        }
    } else if current.map(|c| c.ptr_eq(tab)).unwrap_or(false) {
        view.set_internal("selection", Value::Null);
    }
}

fn tab_parent(services: &WidgetServices) -> Capability {
    let add_services = services.clone();
    let dirty = services.dirty.clone();
    Capability::new(TAB_PARENT)
        .attr(
            "children",
            AttributeDescriptor::new()
                .value_fn(|| Value::List(Vec::new()))
                .read_only(),
        )
        .attr("selection", AttributeDescriptor::new().read_only())
        .on(
            "afterSelectionChange",
            handler(move |e| {
                if let Some(target) = e.target() {
                    dirty.mark(target.guid());
                }
            }),
        )
        .method("add", move |view, args| {
            let tab = instance_arg(args, "add")?;
            if !tab.has_capability(TAB_CHILD) {
                return Err(ComposeError::failed(format!(
                    "{} cannot be added to a tab view",
                    tab.type_name()
                )));
            }
            if tab.peer("parent").is_some() {
                return Err(ComposeError::failed(format!(
                    "{} already has a parent",
                    tab.guid()
                )));
            }

            tab.set_internal("parent", Value::from(view));
            let mut tabs = children(view);
            tabs.push(tab.clone());
            store_children(view, &tabs);

            if let (Some(parent), Some(child)) = (node_of(view), node_of(&tab)) {
                add_services.surface.append_child(parent, child);
            }

            let weak_view = view.downgrade();
            view.listen_to(
                &tab,
                "afterSelectedChange",
                handler(move |e| {
                    let (Some(view), Some(tab)) = (weak_view.upgrade(), e.target()) else {
                        return;
                    };
                    let selected = e.new_val().and_then(|v| v.as_bool()).unwrap_or(false);
                    sync_selection(&view, tab, selected);
                }),
            );
            if flag(&tab, "selected") {
                sync_selection(view, &tab, true);
            }
            debug!(view = %view.guid(), tab = %tab.guid(), "tab added");
            Ok(Value::from(tabs.len()))
        })
        .method("remove", |view, args| {
            let tab = instance_arg(args, "remove")?;
            let mut tabs = children(view);
            let before = tabs.len();
            tabs.retain(|t| !t.ptr_eq(&tab));
            if tabs.len() == before {
                return Ok(Value::Bool(false));
            }
            store_children(view, &tabs);
            if view.peer("selection").map(|s| s.ptr_eq(&tab)).unwrap_or(false) {
                view.set_internal("selection", Value::Null);
            }
            tab.set_internal("parent", Value::Null);
            Ok(Value::Bool(true))
        })
        .method("select", |view, args| {
            let index = index_arg(args, "select")?;
            let tab = children(view)
                .get(index)
                .cloned()
                .ok_or_else(|| ComposeError::failed(format!("no tab at index {index}")))?;
            let outcome = tab.write("selected", Value::Bool(true))?;
            Ok(Value::Bool(outcome.is_committed() || flag(&tab, "selected")))
        })
        .method("item", |view, args| {
            let index = index_arg(args, "item")?;
            Ok(children(view)
                .get(index)
                .map(Value::from)
                .unwrap_or_default())
        })
        .method("size", |view, _| Ok(Value::from(children(view).len())))
}

fn tab_child(services: &WidgetServices) -> Capability {
    let mirror_services = services.clone();
    Capability::new(TAB_CHILD)
        .attr("parent", AttributeDescriptor::new().read_only())
        .attr(
            "selected",
            AttributeDescriptor::new().value(false).validator(validators::is_bool),
        )
        .on(
            "afterSelectedChange",
            handler(move |e| {
                if let Some(target) = e.target() {
                    mirror_services.apply(target, "selected", e.new_val().unwrap_or_default());
                }
            }),
        )
}

pub(crate) fn register(factory: &Factory, services: &WidgetServices, widget: &TypeRef) {
    let parent = factory.register_capability(tab_parent(services));
    let child = factory.register_capability(tab_child(services));

    let view_methods = MethodSet::new().destructor(|view| {
        for tab in children(view) {
            tab.destroy()?;
        }
        Ok(())
    });
    factory.create_from(TAB_VIEW, widget, vec![parent], Schema::new(), view_methods);

    let label_services = services.clone();
    let tab_schema = mirror(
        Schema::new().attr(
            "label",
            AttributeDescriptor::new().value("").validator(validators::is_string),
        ),
        services,
        "label",
    );
    let tab_methods = MethodSet::new()
        .initializer(move |tab, _| {
            label_services.apply(tab, "label", tab.get("label").unwrap_or_default());
            Ok(())
        })
        .destructor(|tab| {
            if let Some(view) = tab.peer("parent") {
                view.call("remove", &[Value::from(tab)])?;
            }
            Ok(())
        })
        .method("select", |tab, _| {
            tab.write("selected", Value::Bool(true))?;
            Ok(Value::Bool(flag(tab, "selected")))
        });
    factory.create_from(TAB, widget, vec![child], tab_schema, tab_methods);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RecordingSurface, RenderSurface, WidgetContext};
    use std::rc::Rc;
    use tessera_core::{value_map, ValueMap};

    fn context() -> (WidgetContext, Rc<RecordingSurface>) {
        let surface = Rc::new(RecordingSurface::new());
        (WidgetContext::new(surface.clone()), surface)
    }

    fn view_with_tabs(ctx: &WidgetContext, labels: &[&str]) -> (Instance, Vec<Instance>) {
        let view = ctx.build(TAB_VIEW, &ValueMap::new()).unwrap();
        let tabs: Vec<_> = labels
            .iter()
            .map(|label| {
                let tab = ctx.build(TAB, &value_map! { "label" => *label }).unwrap();
                view.call("add", &[Value::from(&tab)]).unwrap();
                tab
            })
            .collect();
        (view, tabs)
    }

    #[test]
    fn test_add_links_parent_and_nodes() {
        let (ctx, surface) = context();
        let (view, tabs) = view_with_tabs(&ctx, &["One", "Two"]);

        assert_eq!(view.call("size", &[]), Ok(Value::Int(2)));
        assert!(tabs[0].peer("parent").unwrap().ptr_eq(&view));
        assert_eq!(
            surface.children(node_of(&view).unwrap()),
            vec![node_of(&tabs[0]).unwrap(), node_of(&tabs[1]).unwrap()]
        );
        assert_eq!(view.call("item", &[Value::from(1)]), Ok(Value::from(&tabs[1])));
        assert_eq!(view.call("item", &[Value::from(9)]), Ok(Value::Null));
    }

    #[test]
    fn test_selection_is_exclusive() {
        let (ctx, surface) = context();
        let (view, tabs) = view_with_tabs(&ctx, &["One", "Two", "Three"]);

        view.call("select", &[Value::from(0)]).unwrap();
        assert!(view.peer("selection").unwrap().ptr_eq(&tabs[0]));

        tabs[2].call("select", &[]).unwrap();
        assert!(view.peer("selection").unwrap().ptr_eq(&tabs[2]));
        assert!(!flag(&tabs[0], "selected"));
        assert_eq!(
            surface.property(node_of(&tabs[0]).unwrap(), "selected"),
            Some(Value::Bool(false))
        );

        tabs[2].set("selected", false).unwrap();
        assert!(view.peer("selection").is_none());
    }

    #[test]
    fn test_preselected_tab_becomes_selection() {
        let (ctx, _surface) = context();
        let view = ctx.build(TAB_VIEW, &ValueMap::new()).unwrap();
        let tab = ctx.build(TAB, &value_map! { "selected" => true }).unwrap();
        view.call("add", &[Value::from(&tab)]).unwrap();
        assert!(view.peer("selection").unwrap().ptr_eq(&tab));
    }

    #[test]
    fn test_add_rejects_non_tabs() {
        let (ctx, _surface) = context();
        let (view, tabs) = view_with_tabs(&ctx, &["One"]);
        let other = ctx.build(TAB_VIEW, &ValueMap::new()).unwrap();

        assert!(view.call("add", &[Value::from(&other)]).is_err());
        assert!(view.call("add", &[Value::from(&tabs[0])]).is_err());
        assert!(view.call("add", &[Value::Null]).is_err());
        assert!(view.call("select", &[Value::from(-1)]).is_err());
    }

    #[test]
    fn test_destroying_tab_unlinks_it() {
        let (ctx, _surface) = context();
        let (view, tabs) = view_with_tabs(&ctx, &["One", "Two"]);
        tabs[0].call("select", &[]).unwrap();

        assert_eq!(tabs[0].destroy(), Ok(true));
        assert_eq!(view.call("size", &[]), Ok(Value::Int(1)));
        assert!(view.peer("selection").is_none());
    }

    #[test]
    fn test_destroying_view_destroys_tabs_and_listeners() {
        let (ctx, surface) = context();
        let (view, tabs) = view_with_tabs(&ctx, &["One", "Two"]);
        assert_eq!(view.tracked(), 2);

        assert_eq!(view.destroy(), Ok(true));
        assert!(tabs.iter().all(|t| t.is_destroyed()));
        assert!(tabs.iter().all(|t| !t.events().has_listeners("afterSelectedChange")));
        assert_eq!(view.tracked(), 0);
        assert_eq!(surface.node_count(), 0);
        assert_eq!(ctx.runtime().stats().live_instances, 0);
    }
}
