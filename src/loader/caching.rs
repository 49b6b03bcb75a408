use super::{Loader, LoaderSource};
use crate::error::Result;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};

/// Wraps another loader with a strict-LRU cache of resolved source text,
/// matching `original_source/liquid/utils/cache.py`'s eviction-by-count
/// (not by total byte size) policy and the teacher's `LruMap`-based
/// template cache in `renderer::manager`.
pub struct CachingLoader<L> {
    inner: L,
    cache: Mutex<LruMap<String, (String, Option<String>, String)>>,
    auto_reload: bool,
}

impl<L: Loader> CachingLoader<L> {
    pub fn new(inner: L, capacity: u32, auto_reload: bool) -> Self {
        Self { inner, cache: Mutex::new(LruMap::new(ByLength::new(capacity.max(1)))), auto_reload }
    }
}

#[async_trait::async_trait]
impl<L: Loader> Loader for CachingLoader<L> {
    fn load(&self, name: &str) -> Result<LoaderSource> {
        if let Some((source, uptodate, matter)) = self.cache.lock().get(name).cloned() {
            let fresh = !self.auto_reload
                || uptodate.as_deref().is_none_or(|token| self.inner.is_up_to_date(name, token));
            if fresh {
                log::trace!("template cache hit for {name:?}");
                return Ok(LoaderSource { source, uptodate, matter });
            }
        }
        let resolved = self.inner.load(name)?;
        self.cache.lock().insert(
            name.to_string(),
            (resolved.source.clone(), resolved.uptodate.clone(), resolved.matter.clone()),
        );
        Ok(resolved)
    }

    async fn load_async(&self, name: &str) -> Result<LoaderSource> {
        if let Some((source, uptodate, matter)) = self.cache.lock().get(name).cloned() {
            let fresh = !self.auto_reload
                || uptodate.as_deref().is_none_or(|token| self.inner.is_up_to_date(name, token));
            if fresh {
                log::trace!("template cache hit for {name:?}");
                return Ok(LoaderSource { source, uptodate, matter });
            }
        }
        let resolved = self.inner.load_async(name).await?;
        self.cache.lock().insert(
            name.to_string(),
            (resolved.source.clone(), resolved.uptodate.clone(), resolved.matter.clone()),
        );
        Ok(resolved)
    }

    fn is_up_to_date(&self, name: &str, uptodate: &str) -> bool {
        self.inner.is_up_to_date(name, uptodate)
    }
}
