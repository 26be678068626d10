//! # Filter Registry
//!
//! Owns exactly one [`FilterHandle`] per registered [`FilterId`] and answers
//! catalog queries for menus. Shared between callers through an `Arc`.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{self, FilterCategory, FilterId};
use crate::error::{FilterError, Result};
use crate::filter::{Filter, FilterHandle};
use crate::gpu::GpuContext;
use crate::pool::BufferPoolManager;

pub struct FilterRegistry {
    pools: BufferPoolManager,
    gpu: Option<Arc<GpuContext>>,
    filters: RwLock<HashMap<FilterId, Arc<FilterHandle>>>,
}

impl FilterRegistry {
    /// A registry holding only the passthrough filter.
    pub fn new(pools: BufferPoolManager, gpu: Option<Arc<GpuContext>>) -> Self {
        let registry = Self {
            pools,
            gpu,
            filters: RwLock::new(HashMap::new()),
        };
        let passthrough = catalog::instantiate(FilterId::Passthrough, registry.pools, None);
        registry
            .filters
            .write()
            .insert(FilterId::Passthrough, Arc::new(FilterHandle::new(passthrough)));
        registry
    }

    /// A registry with the whole built-in catalog registered.
    pub fn builtin(pools: BufferPoolManager, gpu: Option<Arc<GpuContext>>) -> Self {
        let registry = Self::new(pools, gpu);
        registry.register_all();
        registry
    }

    /// Instantiates every catalog filter not yet present. Safe to call
    /// again; returns how many were added.
    pub fn register_all(&self) -> usize {
        let mut filters = self.filters.write();
        let mut added = 0;
        for id in FilterId::ALL {
            if filters.contains_key(&id) {
                continue;
            }
            let filter = catalog::instantiate(id, self.pools, self.gpu.clone());
            filters.insert(id, Arc::new(FilterHandle::new(filter)));
            added += 1;
        }
        if added > 0 {
            info!("Registered {} filters ({} total)", added, filters.len());
        }
        added
    }

    /// Adds a custom implementation. Each identifier holds one instance.
    pub fn register(&self, filter: Box<dyn Filter>) -> Result<Arc<FilterHandle>> {
        let id = filter.id();
        let mut filters = self.filters.write();
        if filters.contains_key(&id) {
            return Err(FilterError::DuplicateFilter(id));
        }
        let handle = Arc::new(FilterHandle::new(filter));
        filters.insert(id, handle.clone());
        Ok(handle)
    }

    /// The registered instance. Repeated lookups return the same handle.
    pub fn lookup(&self, id: FilterId) -> Option<Arc<FilterHandle>> {
        let handle = self.filters.read().get(&id).cloned();
        if handle.is_none() {
            warn!("Lookup of unregistered filter {}", id);
        }
        handle
    }

    pub fn contains(&self, id: FilterId) -> bool {
        self.filters.read().contains_key(&id)
    }

    pub fn category_of(&self, id: FilterId) -> Option<FilterCategory> {
        self.filters.read().get(&id).map(|handle| handle.category())
    }

    /// Categories in display order, each with its filters sorted by name.
    pub fn list_categories(&self) -> Vec<(FilterCategory, Vec<FilterId>)> {
        let mut grouped: BTreeMap<FilterCategory, Vec<FilterId>> = BTreeMap::new();
        for handle in self.filters.read().values() {
            grouped.entry(handle.category()).or_default().push(handle.id());
        }
        grouped
            .into_iter()
            .map(|(category, mut ids)| {
                ids.sort_by_key(|id| id.name());
                (category, ids)
            })
            .collect()
    }

    /// Every registered display name, sorted case-insensitively.
    pub fn all_names_sorted(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.filters.read().keys().map(|id| id.name()).collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    pub fn pools(&self) -> BufferPoolManager {
        self.pools
    }

    pub fn gpu(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin(BufferPoolManager::default(), None)
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.len())
            .field("gpu", &self.gpu)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Passthrough;

    #[test]
    fn new_registry_has_passthrough() {
        let registry = FilterRegistry::new(BufferPoolManager::default(), None);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(FilterId::Passthrough));
        assert!(registry.lookup(FilterId::Sepia).is_none());
    }

    #[test]
    fn register_all_is_idempotent() {
        let registry = FilterRegistry::new(BufferPoolManager::default(), None);
        assert_eq!(registry.register_all(), FilterId::ALL.len() - 1);
        let first = registry.lookup(FilterId::Vignette).unwrap();
        assert_eq!(registry.register_all(), 0);
        let second = registry.lookup(FilterId::Vignette).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), FilterId::ALL.len());
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = FilterRegistry::new(BufferPoolManager::default(), None);
        let err = registry
            .register(Box::new(Passthrough::new(BufferPoolManager::default())))
            .unwrap_err();
        assert!(matches!(err, FilterError::DuplicateFilter(FilterId::Passthrough)));
    }

    #[test]
    fn categories_are_ordered_and_sorted() {
        let registry = FilterRegistry::default();
        let categories = registry.list_categories();
        assert_eq!(categories.first().unwrap().0, FilterCategory::Utility);
        assert_eq!(categories.last().unwrap().0, FilterCategory::Composite);

        let blur = categories
            .iter()
            .find(|(category, _)| *category == FilterCategory::Blur)
            .unwrap();
        assert_eq!(blur.1, vec![FilterId::BoxBlur, FilterId::GaussianBlur]);

        let total: usize = categories.iter().map(|(_, ids)| ids.len()).sum();
        assert_eq!(total, registry.len());
    }

    #[test]
    fn names_sorted_case_insensitively() {
        let names = FilterRegistry::default().all_names_sorted();
        assert_eq!(names.len(), FilterId::ALL.len());
        assert!(names
            .windows(2)
            .all(|pair| pair[0].to_lowercase() <= pair[1].to_lowercase()));
        assert_eq!(names[0], "Average");
    }
}
