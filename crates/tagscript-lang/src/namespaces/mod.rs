//! Global built-ins. Each namespace contributes named natives; the registry
//! merges them into one read-only table shared by every run.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::bridge::context::CONTEXT_NAMES;
use crate::runtime::value::{NativeFn, Value};

pub mod core;
pub mod host;

// ─── Export ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub struct Export {
    pub name: &'static str,
    pub func: NativeFn,
}

impl Export {
    pub fn pure(name: &'static str, func: crate::runtime::value::PureFn) -> Self {
        Self { name, func: NativeFn::Pure(func) }
    }

    pub fn async_fn(name: &'static str, func: crate::runtime::value::AsyncFn) -> Self {
        Self { name, func: NativeFn::Async(func) }
    }
}

// ─── Provider interface ───────────────────────────────────────────────────────

pub trait Namespace: Send + Sync {
    fn name(&self) -> &'static str;
    fn exports(&self) -> Vec<Export>;
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct GlobalRegistry {
    providers: Vec<Box<dyn Namespace>>,
    table: HashMap<&'static str, Value>,
}

pub static GLOBALS: Lazy<GlobalRegistry> = Lazy::new(GlobalRegistry::standard);

impl GlobalRegistry {
    pub fn new() -> Self {
        Self { providers: Vec::new(), table: HashMap::new() }
    }

    /// Later providers never override earlier names.
    pub fn register(&mut self, p: Box<dyn Namespace>) {
        for e in p.exports() {
            if self.table.contains_key(e.name) {
                tracing::warn!(namespace = p.name(), name = e.name, "duplicate global ignored");
                continue;
            }
            self.table.insert(e.name, Value::native(e.name, e.func));
        }
        self.providers.push(p);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.table.get(name).cloned()
    }

    /// Built-ins and context names. Scripts may not declare or assign these.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.table.contains_key(name) || CONTEXT_NAMES.contains(&name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().flat_map(|p| p.exports().into_iter().map(|e| e.name))
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(Box::new(core::CoreNamespace));
        r.register(Box::new(host::HostNamespace));
        r
    }
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_globals_are_reserved() {
        for name in ["now", "floor", "embed", "getMember", "parseArgs", "$args"] {
            assert!(GLOBALS.is_reserved(name), "{name}");
        }
        assert!(!GLOBALS.is_reserved("count"));
    }

    #[test]
    fn lookups_share_one_value() {
        let a = GLOBALS.get("floor").unwrap();
        assert!(a.equals(&GLOBALS.get("floor").unwrap()));
        assert_eq!(a.type_name(), "function");
    }

    #[test]
    fn names_cover_both_namespaces() {
        let names: Vec<_> = GLOBALS.names().collect();
        assert!(names.contains(&"typeOf"));
        assert!(names.contains(&"getChannel"));
    }
}
