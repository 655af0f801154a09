//! Module loader contract.
//!
//! The loader/executor that parses and caches modules lives outside this crate. The bootstrap only
//! needs to read source maps out of its cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::sourcemap::SourceMap;

/// The part of the module loader the worker bootstrap depends on.
pub trait ModuleLoader: Send + Sync {
    /// Source map for a generated source id, if the loader produced one.
    fn source_map(&self, source_id: &str) -> Option<Arc<SourceMap>>;
}

/// In-memory source map cache.
#[derive(Debug, Default)]
pub struct ModuleCache {
    source_maps: RwLock<HashMap<String, Arc<SourceMap>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_source_map(&self, source_id: impl Into<String>, map: SourceMap) {
        self.source_maps.write().insert(source_id.into(), Arc::new(map));
    }

    pub fn invalidate(&self, source_id: &str) -> bool {
        self.source_maps.write().remove(source_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.source_maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_maps.read().is_empty()
    }
}

impl ModuleLoader for ModuleCache {
    fn source_map(&self, source_id: &str) -> Option<Arc<SourceMap>> {
        self.source_maps.read().get(source_id).cloned()
    }
}
