//! Global + scope-qualified configuration, servicing both push and pull
//!
//! Generalizes the deep-merge routine a flat settings struct would use
//! into one that works over an open `serde_json::Value` tree, because a
//! scope here is an arbitrary glob over URIs rather than a fixed set of
//! struct fields. The one behavioral addition a fixed-struct merge never
//! needed: an explicit JSON `null` in a patch unsets the key instead of
//! becoming a stored `null` leaf.

use globset::Glob;
use lsp_support::Error;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Deep-merge `overlay` onto `base`. Objects merge recursively; any other
/// value (including arrays) replaces the base value wholesale. A `null`
/// leaf in `overlay` removes the corresponding key from an object base
/// rather than being stored.
pub fn merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.remove(&key);
                    continue;
                }
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_json(base_value, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Reason a configuration change fired, passed to change listeners for
/// diagnostics.
#[derive(Debug, Clone)]
pub enum ChangeReason {
    GlobalUpdated,
    ScopeAdded { pattern: String },
}

type ChangeListener = Arc<dyn Fn(&ChangeReason) + Send + Sync>;

struct Scope {
    pattern: String,
    matcher: globset::GlobMatcher,
    tree: Value,
}

/// Global settings tree plus an ordered list of glob-scoped overlays.
///
/// Resolution for a URI merges global with every matching scope in
/// registration order (later registrations win at conflicting leaves —
/// documented caller-visible behavior, see DESIGN.md's Open Question
/// resolution).
pub struct ConfigStore {
    global: parking_lot::RwLock<Value>,
    scopes: parking_lot::RwLock<Vec<Scope>>,
    listeners: parking_lot::RwLock<Vec<ChangeListener>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            global: parking_lot::RwLock::new(Value::Object(Default::default())),
            scopes: parking_lot::RwLock::new(Vec::new()),
            listeners: parking_lot::RwLock::new(Vec::new()),
        }
    }

    pub fn with_global(global: Value) -> Self {
        let store = Self::new();
        *store.global.write() = global;
        store
    }

    /// Merge `patch` into the global tree and notify listeners.
    pub fn update_global(&self, patch: Value) {
        let mut global = self.global.write();
        *global = merge_json(global.clone(), patch);
        drop(global);
        self.notify(ChangeReason::GlobalUpdated);
    }

    /// Register a new glob-scoped overlay. Scopes are consulted in
    /// registration order when two patterns match the same URI.
    pub fn add_scope(&self, pattern: impl Into<String>, patch: Value) -> Result<(), Error> {
        let pattern = pattern.into();
        let matcher = Glob::new(&pattern)
            .map_err(|e| Error::InvalidConfig {
                field: "scope_pattern".into(),
                reason: e.to_string(),
            })?
            .compile_matcher();
        self.scopes.write().push(Scope {
            pattern: pattern.clone(),
            matcher,
            tree: patch,
        });
        self.notify(ChangeReason::ScopeAdded { pattern });
        Ok(())
    }

    /// Resolve the effective configuration tree for a URI: global merged
    /// with every matching scope, in registration order.
    pub fn resolve(&self, uri: &Url) -> Value {
        let mut result = self.global.read().clone();
        let path = uri.path();
        for scope in self.scopes.read().iter() {
            if scope.matcher.is_match(path) {
                result = merge_json(result, scope.tree.clone());
            }
        }
        result
    }

    /// Resolve a dotted `section` path (e.g. `python.analysis`) within
    /// the tree effective for `uri`, per `workspace/configuration`'s
    /// per-request section addressing.
    pub fn resolve_section(&self, uri: &Url, section: Option<&str>) -> Value {
        let tree = self.resolve(uri);
        match section {
            None => tree,
            Some(section) => section
                .split('.')
                .try_fold(tree, |acc, part| match acc {
                    Value::Object(mut map) => map.remove(part),
                    _ => None,
                })
                .unwrap_or(Value::Null),
        }
    }

    pub fn on_change(&self, listener: ChangeListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, reason: ChangeReason) {
        for listener in self.listeners.read().iter() {
            listener(&reason);
        }
    }
}
