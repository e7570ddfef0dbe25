//! Widget Context - owns the runtime, the render surface and dirty tracking
//!
//! The WidgetContext provides:
//! - A [`TesseraRuntime`] with every stock widget type registered
//! - The [`RenderSurface`] widgets create and mutate their nodes on
//! - Dirty tracking so a renderer only revisits widgets that changed
//!
//! Widget types are ordinary factory types. Their initializers, listeners
//! and destructors reach the surface through a [`WidgetServices`] handle
//! captured at registration time.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};
use tessera_core::{Instance, Result, RuntimeConfig, TesseraRuntime, Value, ValueMap};
use tracing::trace;

use crate::{checkbox, tabs, widget};

new_key_type! {
    /// Identifier of a visual node on a render surface
    pub struct NodeId;
}

// =============================================================================
// RENDER SURFACE
// =============================================================================

/// Where widgets put their visual nodes
///
/// Implementations own the node tree; widgets only hold [`NodeId`]s.
pub trait RenderSurface {
    /// Create a detached node of the given kind
    fn create_node(&self, kind: &str) -> NodeId;

    /// Set a visual property on a node
    fn set_property(&self, node: NodeId, key: &str, value: Value);

    /// Read back a visual property
    fn property(&self, node: NodeId, key: &str) -> Option<Value>;

    /// Attach `child` under `parent`
    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Remove a node and detach it from its parent
    fn remove_node(&self, node: NodeId) -> bool;

    fn contains(&self, node: NodeId) -> bool;
}

/// One recorded surface operation
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Create { node: NodeId, kind: String },
    SetProperty { node: NodeId, key: String, value: Value },
    Append { parent: NodeId, child: NodeId },
    Remove { node: NodeId },
}

#[derive(Debug)]
struct NodeData {
    kind: String,
    props: ValueMap,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory surface recording every operation
#[derive(Debug, Default)]
pub struct RecordingSurface {
    nodes: RefCell<SlotMap<NodeId, NodeData>>,
    ops: RefCell<Vec<SurfaceOp>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations recorded so far
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.borrow().clone()
    }

    /// Drain recorded operations
    pub fn take_ops(&self) -> Vec<SurfaceOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn kind(&self, node: NodeId) -> Option<String> {
        self.nodes.borrow().get(node).map(|n| n.kind.clone())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn record(&self, op: SurfaceOp) {
        self.ops.borrow_mut().push(op);
    }
}

impl RenderSurface for RecordingSurface {
    fn create_node(&self, kind: &str) -> NodeId {
        let node = self.nodes.borrow_mut().insert(NodeData {
            kind: kind.to_string(),
            props: ValueMap::new(),
            parent: None,
            children: Vec::new(),
        });
        self.record(SurfaceOp::Create {
            node,
            kind: kind.to_string(),
        });
        node
    }

    fn set_property(&self, node: NodeId, key: &str, value: Value) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(node) {
            data.props.insert(key.to_string(), value.clone());
        }
        self.record(SurfaceOp::SetProperty {
            node,
            key: key.to_string(),
            value,
        });
    }

    fn property(&self, node: NodeId, key: &str) -> Option<Value> {
        self.nodes
            .borrow()
            .get(node)
            .and_then(|n| n.props.get(key).cloned())
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if !nodes.contains_key(parent) || !nodes.contains_key(child) {
                return;
            }
            if let Some(data) = nodes.get_mut(child) {
                data.parent = Some(parent);
            }
            if let Some(data) = nodes.get_mut(parent) {
                data.children.push(child);
            }
        }
        self.record(SurfaceOp::Append { parent, child });
    }

    fn remove_node(&self, node: NodeId) -> bool {
        let removed = {
            let mut nodes = self.nodes.borrow_mut();
            let Some(data) = nodes.remove(node) else {
                return false;
            };
            if let Some(parent) = data.parent.and_then(|p| nodes.get_mut(p)) {
                parent.children.retain(|c| *c != node);
            }
            for child in data.children {
                if let Some(child) = nodes.get_mut(child) {
                    child.parent = None;
                }
            }
            true
        };
        self.record(SurfaceOp::Remove { node });
        removed
    }

    fn contains(&self, node: NodeId) -> bool {
        self.nodes.borrow().contains_key(node)
    }
}

// =============================================================================
// DIRTY TRACKING
// =============================================================================

/// Guids of widgets whose visual state changed since the last render
#[derive(Debug, Default)]
pub struct DirtyTracker {
    dirty: RefCell<FxHashSet<String>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, guid: &str) {
        trace!(guid, "widget marked dirty");
        self.dirty.borrow_mut().insert(guid.to_string());
    }

    pub fn is_dirty(&self, guid: &str) -> bool {
        self.dirty.borrow().contains(guid)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.dirty.borrow_mut().clear();
    }
}

/// What widget types capture to reach the outside world
#[derive(Clone)]
pub struct WidgetServices {
    pub surface: Rc<dyn RenderSurface>,
    pub dirty: Rc<DirtyTracker>,
}

impl WidgetServices {
    /// Push a visual property for `instance` and mark it dirty
    pub fn apply(&self, instance: &Instance, key: &str, value: Value) {
        if let Some(node) = widget::node_of(instance) {
            self.surface.set_property(node, key, value);
            self.dirty.mark(instance.guid());
        }
    }
}

impl fmt::Debug for WidgetServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetServices")
            .field("dirty", &self.dirty)
            .finish()
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// The main widget context
pub struct WidgetContext {
    runtime: TesseraRuntime,
    services: WidgetServices,
}

impl WidgetContext {
    /// Create a context drawing onto `surface`
    pub fn new(surface: Rc<dyn RenderSurface>) -> Self {
        Self::with_config(surface, RuntimeConfig::default())
    }

    pub fn with_config(surface: Rc<dyn RenderSurface>, config: RuntimeConfig) -> Self {
        let runtime = TesseraRuntime::with_config(config);
        let services = WidgetServices {
            surface,
            dirty: Rc::new(DirtyTracker::new()),
        };
        let factory = runtime.factory();
        let base = widget::register(factory, &services);
        checkbox::register(factory, &services, &base);
        tabs::register(factory, &services, &base);
        Self { runtime, services }
    }

    pub fn runtime(&self) -> &TesseraRuntime {
        &self.runtime
    }

    pub fn surface(&self) -> &Rc<dyn RenderSurface> {
        &self.services.surface
    }

    pub fn services(&self) -> &WidgetServices {
        &self.services
    }

    /// Construct any registered widget type
    pub fn build(&self, type_name: &str, config: &ValueMap) -> Result<Instance> {
        self.runtime.factory().instantiate(type_name, config)
    }

    // =========================================================================
    // Dirty Tracking
    // =========================================================================

    pub fn is_dirty(&self, instance: &Instance) -> bool {
        self.services.dirty.is_dirty(instance.guid())
    }

    pub fn has_dirty(&self) -> bool {
        self.services.dirty.has_dirty()
    }

    /// Clear all dirty flags (call after rendering)
    pub fn clear_dirty(&self) {
        self.services.dirty.clear();
    }
}

impl fmt::Debug for WidgetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetContext")
            .field("stats", &self.runtime.stats())
            .finish()
    }
}
