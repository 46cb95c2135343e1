//! Cache manager configuration.

use url::Url;

use crate::pattern::UrlPattern;
use crate::SwError;

/// Configuration for one deployment of the cache manager.
///
/// The version tag changes every deployment; the manifest is the fixed,
/// ordered list of resource paths making up the app shell.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Deployment version tag (e.g. `v3`).
    pub version_tag: String,

    /// Generation-naming prefix (e.g. `ecotrack-cache-`). Namespaces outside
    /// this prefix are never touched by garbage collection.
    pub cache_prefix: String,

    /// Origin that manifest paths resolve against.
    pub origin: Url,

    /// Ordered resource paths to pre-populate on install.
    pub manifest: Vec<String>,

    /// Patterns forcing requests past the cache (e.g. `/api/`).
    pub bypass: Vec<UrlPattern>,
}

impl ShellConfig {
    /// Create a configuration, validating the naming inputs.
    pub fn new(
        version_tag: impl Into<String>,
        cache_prefix: impl Into<String>,
        origin: Url,
        manifest: Vec<String>,
    ) -> Result<Self, SwError> {
        let version_tag = version_tag.into();
        let cache_prefix = cache_prefix.into();

        if version_tag.is_empty() {
            return Err(SwError::Config("version tag must not be empty".to_string()));
        }
        if cache_prefix.is_empty() {
            return Err(SwError::Config(
                "cache prefix must not be empty".to_string(),
            ));
        }

        Ok(Self {
            version_tag,
            cache_prefix,
            origin,
            manifest,
            bypass: Vec::new(),
        })
    }

    /// Add a bypass pattern.
    pub fn with_bypass(mut self, pattern: UrlPattern) -> Self {
        self.bypass.push(pattern);
        self
    }

    /// Name of this deployment's generation. Pure function of the
    /// configured prefix and tag.
    pub fn generation_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.version_tag)
    }
}
