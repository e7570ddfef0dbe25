//! Tessera Widget Library
//!
//! Stock widgets built entirely through the composition factory.
//!
//! # Architecture
//!
//! The widget layer is a thin consumer of `tessera_core`:
//!
//! 1. **Factory types**: `Widget`, `Checkbox`, `TabView` and `Tab` are
//!    registered types; behavior shared across them lives in capabilities
//!    (`Toggleable`, `TabParent`, `TabChild`).
//!
//! 2. **Attribute-driven rendering**: initializers create a node on the
//!    [`RenderSurface`] and after-change listeners mirror attribute changes
//!    onto it.
//!
//! 3. **Dirty Tracking**: every surface update marks the widget dirty so a
//!    renderer only revisits what changed.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tessera_core::{value_map, Observable, Value, ValueMap};
//! use tessera_widgets::prelude::*;
//!
//! let surface = Rc::new(RecordingSurface::new());
//! let ctx = WidgetContext::new(surface.clone());
//!
//! let view = ctx.build(TAB_VIEW, &ValueMap::new()).unwrap();
//! let tab = ctx.build(TAB, &value_map! { "label" => "General" }).unwrap();
//! view.call("add", &[Value::from(&tab)]).unwrap();
//! view.call("select", &[Value::from(0)]).unwrap();
//!
//! assert!(view.peer("selection").unwrap().ptr_eq(&tab));
//! assert!(ctx.is_dirty(&tab));
//! ```

pub mod checkbox;
pub mod context;
pub mod tabs;
pub mod widget;

pub use checkbox::{CHECKBOX, TOGGLEABLE};
pub use context::{
    DirtyTracker, NodeId, RecordingSurface, RenderSurface, SurfaceOp, WidgetContext,
    WidgetServices,
};
pub use tabs::{TAB, TAB_CHILD, TAB_PARENT, TAB_VIEW};
pub use widget::{node_of, WIDGET};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::checkbox::{CHECKBOX, TOGGLEABLE};
    pub use crate::context::{RecordingSurface, RenderSurface, WidgetContext};
    pub use crate::tabs::{TAB, TAB_VIEW};
    pub use crate::widget::{node_of, WIDGET};
}
