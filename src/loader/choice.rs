use super::{Loader, LoaderSource};
use crate::error::{Error, Result};

/// Tries each loader in order, returning the first hit
/// (`original_source/liquid/choice_loader.py`).
pub struct ChoiceLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl ChoiceLoader {
    pub fn new(loaders: Vec<Box<dyn Loader>>) -> Self {
        Self { loaders }
    }
}

#[async_trait::async_trait]
impl Loader for ChoiceLoader {
    fn load(&self, name: &str) -> Result<LoaderSource> {
        for loader in &self.loaders {
            match loader.load(name) {
                Ok(source) => return Ok(source),
                Err(Error::TemplateNotFound { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(Error::TemplateNotFound { name: name.to_string() })
    }

    async fn load_async(&self, name: &str) -> Result<LoaderSource> {
        for loader in &self.loaders {
            match loader.load_async(name).await {
                Ok(source) => return Ok(source),
                Err(Error::TemplateNotFound { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(Error::TemplateNotFound { name: name.to_string() })
    }

    fn is_up_to_date(&self, name: &str, uptodate: &str) -> bool {
        self.loaders.iter().any(|l| l.is_up_to_date(name, uptodate))
    }
}
