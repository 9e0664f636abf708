//! # Protocol Registry
//!
//! Turn an address into a concrete [`FileEntity`](crate::FileEntity).
//!
//! ## Overview
//!
//! A [`ProtocolRegistry`] maps schemes to [`ProtocolProvider`]s. Resolution
//! runs three checks before any provider code is called:
//!
//! | Step | Failure |
//! |------|---------|
//! | A provider is registered for the scheme | [`FsError::NoSuchProtocol`] |
//! | The provider's scheme demands credentials and the address carries a complete login/password | [`FsError::Authentication`] |
//! | The provider builds the entity | whatever it returns |
//!
//! The resolved entity is then wrapped in an [`ArchiveFile`](crate::ArchiveFile)
//! when its name matches a registered archive format (see
//! [`VfsConfig::archives_enabled`]).
//!
//! ## Pre-fetched Metadata
//!
//! A caller that already holds a native descriptor of the entity (a listing
//! response, for instance) passes it as [`Prefetched`] to
//! [`resolve_with`](ProtocolRegistry::resolve_with). Providers downcast it to
//! their own descriptor type and skip the metadata round trip; an
//! unrecognized value is ignored.
//!
//! ## Example
//!
//! ```rust
//! use unifs::{FileUrl, FsError, ProtocolRegistry};
//!
//! let registry = ProtocolRegistry::new();
//! let err = registry.resolve(&FileUrl::parse("gopher://host/").unwrap()).unwrap_err();
//! assert!(matches!(err, FsError::NoSuchProtocol { .. }));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ArchiveFormats, FileRef, FileUrl, FsError, FsResult, LocalProvider, VfsConfig};

/// Native metadata handed to a provider to avoid a redundant round trip.
pub type Prefetched = Box<dyn Any + Send + Sync>;

/// What a provider sees of the registry while building an entity.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Configuration of the registry.
    pub config: &'a VfsConfig,
}

/// Builds entities for one or more schemes.
pub trait ProtocolProvider: Send + Sync + fmt::Debug {
    /// Whether addresses must carry a non-empty login and password.
    fn requires_credentials(&self) -> bool {
        false
    }

    /// Build the entity at `url`.
    ///
    /// `prefetched` is the caller's native descriptor of the entity, if any.
    ///
    /// # Errors
    ///
    /// - [`FsError::Authentication`] if the backend rejects the credentials
    /// - [`FsError::InvalidUrl`] if the address makes no sense for the protocol
    fn get_file(&self, url: &FileUrl, prefetched: Option<Prefetched>, ctx: &ResolveContext<'_>) -> FsResult<FileRef>;
}

/// Scheme-keyed set of providers.
///
/// Providers can be registered and removed through `&self`; the map is
/// behind a `parking_lot::RwLock`.
pub struct ProtocolRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ProtocolProvider>>>,
    formats: ArchiveFormats,
    config: VfsConfig,
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("schemes", &self.schemes())
            .field("formats", &self.formats.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ProtocolRegistry {
    /// Registry with the `file` scheme, the built-in archive formats and the
    /// default configuration.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Registry with the `file` scheme, the built-in archive formats and
    /// `config`.
    pub fn with_config(config: VfsConfig) -> Self {
        let registry = Self {
            providers: RwLock::new(HashMap::new()),
            formats: ArchiveFormats::default(),
            config,
        };
        registry.register(crate::url::LOCAL_SCHEME, Arc::new(LocalProvider));
        registry
    }

    /// Replace the archive formats consulted on resolution.
    pub fn with_formats(mut self, formats: ArchiveFormats) -> Self {
        self.formats = formats;
        self
    }

    /// Register `provider` for `scheme` (case-insensitive), replacing any
    /// previous one. Returns the replaced provider.
    pub fn register(&self, scheme: &str, provider: Arc<dyn ProtocolProvider>) -> Option<Arc<dyn ProtocolProvider>> {
        self.providers.write().insert(scheme.to_ascii_lowercase(), provider)
    }

    /// Remove the provider of `scheme`.
    pub fn unregister(&self, scheme: &str) -> Option<Arc<dyn ProtocolProvider>> {
        self.providers.write().remove(&scheme.to_ascii_lowercase())
    }

    /// The provider of `scheme`, if any.
    pub fn provider(&self, scheme: &str) -> Option<Arc<dyn ProtocolProvider>> {
        self.providers.read().get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.providers.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// The configuration handed to providers.
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// The archive formats consulted on resolution.
    pub fn formats(&self) -> &ArchiveFormats {
        &self.formats
    }

    /// Resolve `url` without pre-fetched metadata.
    pub fn resolve(&self, url: &FileUrl) -> FsResult<FileRef> {
        self.resolve_with(url, None)
    }

    /// Parse `input` and resolve it.
    pub fn resolve_str(&self, input: &str) -> FsResult<FileRef> {
        self.resolve(&FileUrl::parse(input)?)
    }

    /// Resolve `url`, handing `prefetched` to the provider.
    ///
    /// # Errors
    ///
    /// - [`FsError::NoSuchProtocol`] if no provider handles the scheme
    /// - [`FsError::Authentication`] if the scheme requires credentials and
    ///   the address lacks a login or a password; no provider code runs
    /// - any error of the provider
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub fn resolve_with(&self, url: &FileUrl, prefetched: Option<Prefetched>) -> FsResult<FileRef> {
        let provider = self.provider(url.scheme()).ok_or_else(|| FsError::NoSuchProtocol {
            scheme: url.scheme().to_string(),
        })?;

        if provider.requires_credentials() && url.credentials().is_none_or(|c| c.is_incomplete()) {
            tracing::debug!("credentials required but missing");
            return Err(FsError::Authentication { url: url.clone() });
        }

        let ctx = ResolveContext { config: &self.config };
        let file = provider.get_file(url, prefetched, &ctx)?;
        tracing::debug!(operations = file.supported_operations().len(), "resolved");

        Ok(self.wrap_archive(file))
    }

    /// Wrap `file` as an archive if archives are enabled and a format matches.
    ///
    /// Children returned by `ls()` are not wrapped automatically; pass them
    /// through here to browse nested containers.
    pub fn wrap_archive(&self, file: FileRef) -> FileRef {
        if self.config.archives_enabled {
            self.formats.wrap(file)
        } else {
            file
        }
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
