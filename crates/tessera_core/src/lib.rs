//! Tessera Core Runtime
//!
//! This crate provides the object runtime every Tessera widget is built on:
//!
//! - **Event Bus**: cancelable, reentrant publish/subscribe per instance
//! - **Attribute Store**: declared, validated, observable properties
//! - **Class Composer**: level-by-level construction and teardown
//! - **Composition Factory**: single-parent types with orthogonal capabilities
//! - **Registry**: monotonic ids and guid lookup
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tessera_core::attribute::{validators, AttributeDescriptor, Observable};
//! use tessera_core::class::{MethodSet, Schema};
//! use tessera_core::events::handler;
//! use tessera_core::{TesseraRuntime, Value, ValueMap};
//!
//! let runtime = TesseraRuntime::new();
//! runtime
//!     .factory()
//!     .create(
//!         "Switch",
//!         None,
//!         &[],
//!         Schema::new().attr(
//!             "enabled",
//!             AttributeDescriptor::new().value(false).validator(validators::is_bool),
//!         ),
//!         MethodSet::new(),
//!     )
//!     .unwrap();
//!
//! let switch = runtime.factory().instantiate("Switch", &ValueMap::new()).unwrap();
//!
//! let changes = Rc::new(RefCell::new(Vec::new()));
//! let sink = changes.clone();
//! switch.after("enabledChange", handler(move |e| sink.borrow_mut().push(e.new_val())));
//!
//! switch.set("enabled", true).unwrap();
//! assert_eq!(*changes.borrow(), vec![Some(Value::Bool(true))]);
//! ```

pub mod attribute;
pub mod class;
pub mod composer;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod instance;
pub mod merge;
pub mod registry;
pub mod runtime;
pub mod value;

pub use attribute::{
    validators, AttributeDescriptor, AttributeHost, AttributeSchema, AttributeStore, Observable,
    WriteOutcome,
};
pub use class::{
    method, Capability, CapabilityRef, EventSchema, Method, MethodSet, Schema, TypeDescriptor,
    TypeRef, ROOT_TYPE,
};
pub use config::{ReadOnlyInit, RuntimeConfig, TeardownPolicy};
pub use error::{AttributeError, ComposeError, ConfigError, DependencyKind, Result};
pub use events::{handler, Event, EventTarget, Handler, ListenOptions, ListenerId, Subscription};
pub use factory::Factory;
pub use instance::{Instance, Lifecycle, WeakInstance};
pub use registry::{Registry, Sequence};
pub use runtime::{RuntimeStats, TesseraRuntime};
pub use value::{Value, ValueMap};
