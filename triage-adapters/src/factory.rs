//! Adapter factory keyed by the source type discriminator

use crate::adapter::SourceAdapter;
use crate::database::DatabaseAdapter;
use crate::file::FileAdapter;
use crate::github::GitHostAdapter;
use crate::web::WebAdapter;
use crate::wiki::WikiAdapter;
use std::sync::Arc;
use triage_core::{SourceConfig, SourceError, SourceType};

/// Build the adapter variant for a source config. The returned adapter is
/// not yet initialized; the registry does that on registration.
pub fn build_adapter(config: &SourceConfig) -> Result<Arc<dyn SourceAdapter>, SourceError> {
    match config.source_type {
        SourceType::File => Ok(Arc::new(FileAdapter::new(config.clone()))),
        SourceType::Web => Ok(Arc::new(WebAdapter::new(config.clone())?)),
        SourceType::Wiki => Ok(Arc::new(WikiAdapter::new(config.clone())?)),
        SourceType::GitHost => Ok(Arc::new(GitHostAdapter::new(config.clone())?)),
        SourceType::Database => Ok(Arc::new(DatabaseAdapter::new(config.clone())?)),
        SourceType::Other => Err(SourceError::Permanent {
            source_name: config.name.clone(),
            code: "config".to_string(),
            reason: "no adapter variant for source type 'other'".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_factory_dispatches_on_type() {
        let mut file = SourceConfig::new("docs", SourceType::File);
        file.paths.push(PathBuf::from("/tmp"));
        assert_eq!(build_adapter(&file).unwrap().source_type(), SourceType::File);

        let web = SourceConfig::new("kb", SourceType::Web).with_base_url("https://kb.local");
        assert_eq!(build_adapter(&web).unwrap().source_type(), SourceType::Web);

        let other = SourceConfig::new("x", SourceType::Other);
        assert!(build_adapter(&other).is_err());
    }
}
