//! In-process cache of rendered package views (§4.F).
//!
//! The cached view is a pure function of store state for a given name;
//! the whole contract is "any writer of a package removes it from the
//! cache before returning to its caller". This mirrors the teacher's
//! `web::Data<Mutex<PackageIndex>>` sharing pattern in `main.rs`,
//! generalized from "one shared index" to "one shared map of rendered
//! views" guarded by a `RwLock` rather than a `Mutex`, since reads here
//! vastly outnumber writes.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct ViewCache {
    views: RwLock<HashMap<String, serde_json::Value>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.views.read().unwrap().get(name).cloned()
    }

    pub fn put(&self, name: &str, view: serde_json::Value) {
        self.views.write().unwrap().insert(name.to_string(), view);
    }

    /// Evict the cached view for `name`, if any. A no-op if nothing was
    /// cached, so every write path can call this unconditionally.
    pub fn invalidate(&self, name: &str) {
        self.views.write().unwrap().remove(name);
    }
}
