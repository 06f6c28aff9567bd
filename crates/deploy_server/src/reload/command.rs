use crate::error::DispatchError;
use plugin_manifest::MetadataExtractor;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The reload command sent for an uploaded archive.
///
/// Usually a fixed literal such as `reload`. A template containing
/// `{plugin}` is filled with the name declared in the archive's manifest,
/// e.g. `plugman reload {plugin}`.
#[derive(Clone)]
pub struct ReloadCommand {
    template: String,
    extractor: Arc<dyn MetadataExtractor>,
}

impl ReloadCommand {
    pub const PLUGIN_PLACEHOLDER: &'static str = "{plugin}";

    pub fn new(template: impl Into<String>, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self {
            template: template.into(),
            extractor,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn needs_plugin_name(&self) -> bool {
        self.template.contains(Self::PLUGIN_PLACEHOLDER)
    }

    /// Produces the concrete command line for `archive`.
    pub async fn render(&self, archive: &Path) -> Result<String, DispatchError> {
        if !self.needs_plugin_name() {
            return Ok(self.template.clone());
        }

        let extractor = self.extractor.clone();
        let path = archive.to_path_buf();
        let name = tokio::task::spawn_blocking(move || extractor.plugin_name(&path)).await??;

        match name {
            Some(name) => Ok(self.template.replace(Self::PLUGIN_PLACEHOLDER, &name)),
            None => Err(DispatchError::PluginNameMissing(archive.to_path_buf())),
        }
    }
}

impl fmt::Debug for ReloadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadCommand")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}
