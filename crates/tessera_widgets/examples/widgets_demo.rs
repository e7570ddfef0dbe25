//! Widgets demo
//!
//! Builds a checkbox and a tab view on a recording surface and prints the
//! surface operations each interaction produces.
//!
//! Run with: cargo run -p tessera_widgets --example widgets_demo
//! Set `RUST_LOG=tessera_core=debug` to watch the runtime.

use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use tessera_core::{value_map, Observable, RuntimeConfig, Value, ValueMap};
use tessera_widgets::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = Path::new("tessera.toml");
    let config = if config_path.exists() {
        RuntimeConfig::load(config_path)?
    } else {
        RuntimeConfig::default().with_id_prefix("demo")
    };

    let surface = Rc::new(RecordingSurface::new());
    let ctx = WidgetContext::with_config(surface.clone(), config);

    let remember = ctx.build(CHECKBOX, &value_map! { "label" => "Remember me" })?;
    remember.call("toggle", &[])?;
    println!("checkbox {} checked = {:?}", remember.guid(), remember.get("checked"));

    let view = ctx.build(TAB_VIEW, &ValueMap::new())?;
    for label in ["General", "Advanced", "About"] {
        let tab = ctx.build(TAB, &value_map! { "label" => label })?;
        view.call("add", &[Value::from(&tab)])?;
    }
    view.call("select", &[Value::from(1)])?;
    if let Some(selected) = view.peer("selection") {
        println!("selected tab: {:?}", selected.get("label"));
    }

    for op in surface.take_ops() {
        println!("{op:?}");
    }

    let (destroyed, errors) = ctx.runtime().unload();
    println!("unloaded {destroyed} widgets, {} teardown errors", errors.len());
    println!("stats: {:?}", ctx.runtime().stats());
    Ok(())
}
