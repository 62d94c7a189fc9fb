#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::{ProjectedAtlas, ProjectionConfig, ReprojectionPipeline, SourceIdentity, SourceLoader};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Registry entry shared by every projection of one source.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub ref_count: usize,
    pub pipeline: ReprojectionPipeline,
}

pub(crate) type SharedEntry = Rc<RefCell<CacheEntry>>;

struct Registry {
    loader: Rc<dyn SourceLoader>,
    config: ProjectionConfig,
    entries: HashMap<SourceIdentity, SharedEntry>,
    /// Atlases of released entries that callers still hold.
    published: HashMap<SourceIdentity, Weak<ProjectedAtlas>>,
}

/// Registry of projected atlases keyed by source identity.
///
/// There is at most one entry (and therefore one load and one atlas) per
/// distinct source. Entries are reference counted by the projections that
/// acquired them and dropped, GPU resources included, when the last one is
/// destroyed. An atlas a caller still holds at that point is remembered, and
/// a later projection of the same source reuses it instead of reloading.
/// Clones share the same registry; it lives as long as its
/// rendering context holds a clone.
#[derive(Clone)]
pub struct ProjectionCache {
    registry: Rc<RefCell<Registry>>,
}

impl ProjectionCache {
    pub fn new(loader: impl SourceLoader + 'static) -> Self {
        Self::with_config(loader, ProjectionConfig::default())
    }

    pub fn with_config(loader: impl SourceLoader + 'static, config: ProjectionConfig) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                loader: Rc::new(loader),
                config,
                entries: HashMap::new(),
                published: HashMap::new(),
            })),
        }
    }

    pub fn config(&self) -> ProjectionConfig {
        self.registry.borrow().config
    }

    /// Number of distinct live sources.
    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().entries.is_empty()
    }

    pub fn contains(&self, source: &SourceIdentity) -> bool {
        self.registry.borrow().entries.contains_key(source)
    }

    /// Number of live projections referencing a source.
    pub fn ref_count(&self, source: &SourceIdentity) -> usize {
        match self.registry.borrow().entries.get(source) {
            Some(entry) => entry.borrow().ref_count,
            None => 0,
        }
    }

    /// Returns the entry for a source, creating it if needed, and takes a
    /// reference to it.
    pub(crate) fn acquire(&self, source: &SourceIdentity) -> SharedEntry {
        let mut registry = self.registry.borrow_mut();

        if let Some(entry) = registry.entries.get(source) {
            entry.borrow_mut().ref_count += 1;
            debug!("attached to existing projection of `{}'", source);

            return entry.clone();
        }

        let (loader, config) = (registry.loader.clone(), registry.config);

        let held = registry.published.remove(source).and_then(|atlas| atlas.upgrade());

        let pipeline = match held {
            Some(atlas) => {
                debug!("reusing held atlas for `{}'", source);
                ReprojectionPipeline::published(source.clone(), loader, config, atlas)
            }
            None => ReprojectionPipeline::new(source.clone(), loader, config),
        };

        let entry = Rc::new(RefCell::new(CacheEntry {
            ref_count: 1,
            pipeline,
        }));

        registry.entries.insert(source.clone(), entry.clone());
        debug!("created projection cache entry for `{}'", source);

        entry
    }

    /// Gives back a reference taken by `acquire`, dropping the entry and its
    /// resources once nothing references it.
    pub(crate) fn release(&self, source: &SourceIdentity, entry: SharedEntry) {
        let remaining = {
            let mut entry = entry.borrow_mut();
            entry.ref_count -= 1;
            entry.ref_count
        };

        if remaining > 0 {
            return;
        }

        let removed = {
            let mut registry = self.registry.borrow_mut();

            let is_current = registry
                .entries
                .get(source)
                .map_or(false, |current| Rc::ptr_eq(current, &entry));

            registry.published.retain(|_, atlas| atlas.strong_count() > 0);

            if !is_current {
                None
            } else {
                if let Some(atlas) = entry.borrow().pipeline.atlas() {
                    registry.published.insert(source.clone(), Rc::downgrade(&atlas));
                }

                registry.entries.remove(source)
            }
        };

        debug!("released projection cache entry for `{}'", source);

        // dropped outside the registry borrow: textures release through the device
        drop(removed);
        drop(entry);
    }
}

impl fmt::Debug for ProjectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();

        f.debug_struct("ProjectionCache")
            .field("config", &registry.config)
            .field("entries", &registry.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadRequest;

    fn cache() -> ProjectionCache {
        ProjectionCache::new(|_: &SourceIdentity| LoadRequest::pending().1)
    }

    #[test]
    fn entries_are_shared_per_source() {
        let cache = cache();
        let source = SourceIdentity::from("a.ktx2");

        let first = cache.acquire(&source);
        let second = cache.acquire(&source);
        let other = cache.acquire(&"b.ktx2".into());

        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(cache.ref_count(&source), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_are_dropped_with_their_last_reference() {
        let cache = cache();
        let source = SourceIdentity::from("a.ktx2");

        let first = cache.acquire(&source);
        let second = cache.acquire(&source);

        cache.release(&source, first);
        assert!(cache.contains(&source));
        assert_eq!(cache.ref_count(&source), 1);

        cache.release(&source, second);
        assert!(!cache.contains(&source));
        assert!(cache.is_empty());
    }

    #[test]
    fn released_sources_get_fresh_entries() {
        let cache = cache();
        let source = SourceIdentity::from("a.ktx2");

        let first = cache.acquire(&source);
        let weak = Rc::downgrade(&first);
        cache.release(&source, first);

        let second = cache.acquire(&source);

        assert!(weak.upgrade().is_none());
        assert_eq!(second.borrow().ref_count, 1);
    }

    #[test]
    fn unfinished_entries_publish_nothing() {
        let cache = cache();
        let source = SourceIdentity::from("a.ktx2");

        let entry = cache.acquire(&source);
        cache.release(&source, entry);

        assert!(cache.registry.borrow().published.is_empty());
        assert_eq!(
            cache.acquire(&source).borrow().pipeline.state(),
            crate::PipelineState::Uninitialized
        );
    }
}
