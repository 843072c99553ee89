//! Statement-scope frames. Each frame owns its variables and points at its
//! parent; lookups walk innermost to outermost.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::runtime::value::Value;

pub struct Scope {
    parent: Option<Arc<Scope>>,
    vars: RwLock<IndexMap<String, Value>>,
}

impl Scope {
    pub fn root() -> Arc<Self> {
        Arc::new(Self { parent: None, vars: RwLock::new(IndexMap::new()) })
    }

    pub fn child(parent: &Arc<Scope>) -> Arc<Self> {
        Arc::new(Self { parent: Some(parent.clone()), vars: RwLock::new(IndexMap::new()) })
    }

    /// Create or overwrite `name` in this frame.
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.vars.write().insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(v) = frame.vars.read().get(name) {
                return Some(v.clone());
            }
            frame = frame.parent.as_deref()?;
        }
    }

    /// The frame that holds `name`, if any.
    pub fn owner(self: &Arc<Self>, name: &str) -> Option<Arc<Scope>> {
        let mut frame = self;
        loop {
            if frame.vars.read().contains_key(name) {
                return Some(frame.clone());
            }
            frame = frame.parent.as_ref()?;
        }
    }

    /// Overwrite an existing cell anywhere in the chain. Returns false when
    /// `name` is not declared.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut frame = self;
        loop {
            if let Some(slot) = frame.vars.write().get_mut(name) {
                *slot = value;
                return true;
            }
            match frame.parent.as_deref() {
                Some(parent) => frame = parent,
                None => return false,
            }
        }
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
    }

    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut frame = self.parent.as_deref();
        while let Some(f) = frame {
            n += 1;
            frame = f.parent.as_deref();
        }
        n
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.vars.read().keys().cloned().collect();
        f.debug_struct("Scope").field("vars", &names).field("depth", &self.depth()).finish()
    }
}
