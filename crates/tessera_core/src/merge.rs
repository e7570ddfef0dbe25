//! Merge and inheritance utilities
//!
//! The composition factory is built from a handful of small, order-sensitive
//! merge rules:
//!
//! - [`mix`]: copy entries from a supplier into a receiver, optionally
//!   overwriting, optionally limited to a whitelist
//! - [`merge`]: combine several maps, last writer wins
//! - [`merge_statics`]: the capability statics rule (scalars adopted only if
//!   absent, mappings merged key by key, first writer wins)
//! - [`augment`]: copy methods flatly onto a method template
//! - [`extend`]: link a type to its single parent

use indexmap::IndexMap;

use crate::class::{Method, TypeDescriptor, TypeRef};
use crate::value::{Value, ValueMap};

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Uppercase the first character
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"valueChange"` → `"afterValueChange"`
pub fn after_type(event_type: &str) -> String {
    format!("after{}", capitalize(event_type))
}

/// `"value"` → `"valueChange"`
pub fn change_type(attr: &str) -> String {
    format!("{attr}Change")
}

// =============================================================================
// MAPS
// =============================================================================

/// Copy entries of `supplier` into `receiver`
///
/// Existing keys are only replaced when `overwrite` is set. With a
/// whitelist, only the listed keys are considered. Returns the number of
/// entries written.
pub fn mix<V: Clone>(
    receiver: &mut IndexMap<String, V>,
    supplier: &IndexMap<String, V>,
    overwrite: bool,
    whitelist: Option<&[&str]>,
) -> usize {
    let mut written = 0;
    for (key, value) in supplier {
        if let Some(allowed) = whitelist {
            if !allowed.contains(&key.as_str()) {
                continue;
            }
        }
        if overwrite || !receiver.contains_key(key) {
            receiver.insert(key.clone(), value.clone());
            written += 1;
        }
    }
    written
}

/// Combine maps into a new one, later maps overriding earlier ones
pub fn merge(maps: &[&ValueMap]) -> ValueMap {
    let mut out = ValueMap::new();
    for map in maps {
        mix(&mut out, map, true, None);
    }
    out
}

/// Merge capability statics into a type's statics
///
/// Scalar statics are adopted only when the receiver lacks them. Mapping
/// statics are merged key by key, keeping keys the receiver already has.
pub fn merge_statics(receiver: &mut ValueMap, supplier: &ValueMap) {
    for (key, value) in supplier {
        match (receiver.get_mut(key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => {
                mix(existing, incoming, false, None);
            }
            (Some(_), _) => {}
            (None, _) => {
                receiver.insert(key.clone(), value.clone());
            }
        }
    }
}

// =============================================================================
// METHODS
// =============================================================================

/// Flat table of methods keyed by name
pub type MethodTable = IndexMap<String, Method>;

/// The method-resolution template of a type
///
/// A copy of the parent's template overlaid with the type's own and
/// capability methods; lookups never walk the parent chain at call time.
#[derive(Clone, Default)]
pub struct MethodTemplate {
    /// Name of the type this template currently belongs to
    pub constructor: String,
    pub methods: MethodTable,
}

impl MethodTemplate {
    pub fn new(constructor: impl Into<String>) -> Self {
        Self {
            constructor: constructor.into(),
            methods: MethodTable::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Copy methods flatly onto a template; returns how many were written
pub fn augment(template: &mut MethodTemplate, methods: &MethodTable, overwrite: bool) -> usize {
    mix(&mut template.methods, methods, overwrite, None)
}

/// Link `child` to its single parent
///
/// Installs a copy of the parent's method template, rebinds the template's
/// constructor to the child, records the parent as the child's superclass
/// and overlays `overrides` on top.
pub fn extend(child: &mut TypeDescriptor, parent: &TypeRef, overrides: &MethodTable) {
    let mut template = parent.template.clone();
    template.constructor = child.name.clone();
    augment(&mut template, overrides, true);
    child.template = template;
    child.parent = Some(parent.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::method;
    use crate::value_map;

    #[test]
    fn test_event_names() {
        assert_eq!(capitalize("value"), "Value");
        assert_eq!(capitalize(""), "");
        assert_eq!(after_type("valueChange"), "afterValueChange");
        assert_eq!(change_type("enabled"), "enabledChange");
    }

    #[test]
    fn test_mix_respects_overwrite_and_whitelist() {
        let mut receiver = value_map! { "a" => 1, "b" => 2 };
        let supplier = value_map! { "a" => 10, "c" => 30, "d" => 40 };

        assert_eq!(mix(&mut receiver, &supplier, false, None), 2);
        assert_eq!(receiver.get("a"), Some(&Value::Int(1)));
        assert_eq!(receiver.get("c"), Some(&Value::Int(30)));

        let written = mix(&mut receiver, &supplier, true, Some(&["a"]));
        assert_eq!(written, 1);
        assert_eq!(receiver.get("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_merge_last_wins() {
        let a = value_map! { "x" => 1, "y" => 1 };
        let b = value_map! { "y" => 2 };
        let merged = merge(&[&a, &b]);
        assert_eq!(merged.get("x"), Some(&Value::Int(1)));
        assert_eq!(merged.get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_merge_statics_first_writer_wins() {
        let mut statics = value_map! {
            "kind" => "button",
            "defaults" => value_map! { "size" => "small" },
        };
        let capability = value_map! {
            "kind" => "focusable",
            "version" => 2,
            "defaults" => value_map! { "size" => "large", "tabIndex" => 0 },
        };

        merge_statics(&mut statics, &capability);
        assert_eq!(statics.get("kind"), Some(&Value::from("button")));
        assert_eq!(statics.get("version"), Some(&Value::Int(2)));
        let defaults = statics.get("defaults").and_then(Value::as_map).unwrap();
        assert_eq!(defaults.get("size"), Some(&Value::from("small")));
        assert_eq!(defaults.get("tabIndex"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_augment() {
        let mut template = MethodTemplate::new("Thing");
        let mut first = MethodTable::new();
        first.insert("name".into(), method(|_, _| Ok(Value::from("first"))));
        let mut second = MethodTable::new();
        second.insert("name".into(), method(|_, _| Ok(Value::from("second"))));
        second.insert("other".into(), method(|_, _| Ok(Value::Null)));

        assert_eq!(augment(&mut template, &first, false), 1);
        assert_eq!(augment(&mut template, &second, false), 1);
        assert_eq!(template.len(), 2);
        assert!(template.contains("other"));
    }
}
