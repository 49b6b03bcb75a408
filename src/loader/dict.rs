use super::{Loader, LoaderSource};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory loader backed by a name -> source map, the simplest
/// possible backend and the one used throughout this crate's own test
/// suite (grounded on `original_source/liquid/dict_loader.py`).
#[derive(Default)]
pub struct DictLoader {
    templates: RwLock<HashMap<String, String>>,
}

impl DictLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(templates: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { templates: RwLock::new(templates.into_iter().collect()) }
    }

    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.write().insert(name.into(), source.into());
    }
}

impl Loader for DictLoader {
    fn load(&self, name: &str) -> Result<LoaderSource> {
        self.templates
            .read()
            .get(name)
            .map(|source| LoaderSource { source: source.clone(), uptodate: None, matter: name.to_string() })
            .ok_or_else(|| Error::TemplateNotFound { name: name.to_string() })
    }
}
