//! The optional expression cache (spec §4.2): an LRU keyed on raw
//! expression text, mapping to a pre-parsed [`Expression`]. Grounded on the
//! teacher's `schnellru::LruMap` usage for its own Lua-VM cache
//! (`renderer/manager.rs`).

use super::ast::Expression;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};

pub struct ExpressionCache {
    map: Mutex<LruMap<String, Expression>>,
}

impl ExpressionCache {
    pub fn new(capacity: u32) -> Self {
        Self { map: Mutex::new(LruMap::new(ByLength::new(capacity.max(1)))) }
    }

    pub fn get_or_insert_with(
        &self,
        key: &str,
        parse: impl FnOnce() -> crate::error::Result<Expression>,
    ) -> crate::error::Result<Expression> {
        if let Some(hit) = self.map.lock().get(key) {
            log::trace!("expression cache hit for {key:?}");
            return Ok(hit.clone());
        }
        let parsed = parse()?;
        self.map.lock().insert(key.to_string(), parsed.clone());
        Ok(parsed)
    }
}
