//! Map of independently locked cells.
//!
//! The outer map lock is held only to find or insert a cell; each key's value
//! is then mutated under its own mutex, so different keys never contend on
//! read-modify-write and the same key is always serialized.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

#[derive(Debug)]
pub struct KeyedCells<V> {
    cells: RwLock<HashMap<String, Arc<Mutex<V>>>>,
}

impl<V> Default for KeyedCells<V> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> KeyedCells<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the value for `key` while holding that key's lock.
    /// The value is created with `init` on first access.
    pub fn with<R>(&self, key: &str, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let cell = self.cell(key, init);
        let mut guard = cell.lock();
        f(&mut guard)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.cells.write().remove(key).is_some()
    }

    /// Drop every entry for which `keep` returns false; returns how many were dropped.
    ///
    /// A caller already holding a removed cell finishes its update on that
    /// detached cell; the next access for the key starts from `init`.
    pub fn retain(&self, mut keep: impl FnMut(&V) -> bool) -> usize {
        let mut cells = self.cells.write();
        let before = cells.len();
        cells.retain(|_, cell| keep(&cell.lock()));
        before - cells.len()
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, key: &str, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        if let Some(cell) = self.cells.read().get(key) {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write();
        Arc::clone(
            cells
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(init()))),
        )
    }
}

impl<V: Clone> KeyedCells<V> {
    /// Point-in-time copy of every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, V)> {
        let cells: Vec<(String, Arc<Mutex<V>>)> = self
            .cells
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let mut out: Vec<(String, V)> = cells
            .into_iter()
            .map(|(k, cell)| (k, cell.lock().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
