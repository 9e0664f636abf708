//! Error types for the virtual file tree.

use crate::{FileOperation, FileUrl};

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// File entity error type.
///
/// Every variant carries the address or operation it concerns. Uses
/// `#[non_exhaustive]` for forward compatibility.
///
/// # Taxonomy
///
/// | Variant | Meaning | Retried by the core? |
/// |---------|---------|----------------------|
/// | [`UnsupportedOperation`](FsError::UnsupportedOperation) | Capability absent | never |
/// | [`Authentication`](FsError::Authentication) | Missing or rejected credentials | never |
/// | [`NotFound`](FsError::NotFound) | Entity does not exist | never |
/// | [`StructuralFormat`](FsError::StructuralFormat) | Container layout cannot be inferred | never |
/// | [`Io`](FsError::Io), [`Backend`](FsError::Backend) | Transport / backend failure | never (the job layer may) |
///
/// # Examples
///
/// ```rust
/// use unifs::{FileOperation, FsError};
///
/// let err = FsError::unsupported(FileOperation::Rename);
/// assert_eq!(err.to_string(), "operation not supported: rename");
/// assert_eq!(err.unsupported_operation(), Some(FileOperation::Rename));
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    // Capability errors
    /// The entity type does not implement this operation.
    #[error("operation not supported: {operation}")]
    UnsupportedOperation {
        /// The unsupported operation.
        operation: FileOperation,
    },

    /// A permission bit outside the backend's changeable mask was targeted.
    #[error("permission bit not changeable: {access:?}/{permission:?}")]
    PermissionNotChangeable {
        /// The access class (user, group, other).
        access: crate::PermissionAccess,
        /// The permission type (read, write, execute).
        permission: crate::PermissionType,
    },

    // Address errors
    /// No provider is registered for the scheme.
    #[error("no such protocol: {scheme}")]
    NoSuchProtocol {
        /// The unknown scheme.
        scheme: String,
    },

    /// The address could not be parsed.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Credentials are missing or were rejected.
    #[error("authentication required: {url}")]
    Authentication {
        /// The address that requires authentication.
        url: FileUrl,
    },

    // Entity errors
    /// The entity does not exist.
    #[error("not found: {url}")]
    NotFound {
        /// The address that was not found.
        url: FileUrl,
    },

    /// The entity cannot be listed.
    #[error("not a directory: {url}")]
    NotADirectory {
        /// The address of the non-directory.
        url: FileUrl,
    },

    /// The directory still has children.
    #[error("directory not empty: {url}")]
    DirectoryNotEmpty {
        /// The address of the directory.
        url: FileUrl,
    },

    /// The entity already exists.
    #[error("{operation}: already exists: {url}")]
    AlreadyExists {
        /// The address that already exists.
        url: FileUrl,
        /// The operation that failed.
        operation: &'static str,
    },

    // Data errors
    /// A byte container has a layout that cannot be interpreted safely.
    #[error("{format}: malformed container ({details})")]
    StructuralFormat {
        /// Name of the container format.
        format: &'static str,
        /// What was wrong.
        details: String,
    },

    // Serialization errors
    /// Serializing a value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserializing a value failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Backend errors
    /// Protocol backend fault that is not an `io::Error`.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error with context.
    #[error("{operation} failed for {url}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The address involved.
        url: FileUrl,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Shorthand for [`FsError::UnsupportedOperation`].
    #[inline]
    pub fn unsupported(operation: FileOperation) -> Self {
        FsError::UnsupportedOperation { operation }
    }

    /// The operation, if this is an [`UnsupportedOperation`](FsError::UnsupportedOperation) error.
    pub fn unsupported_operation(&self) -> Option<FileOperation> {
        match self {
            FsError::UnsupportedOperation { operation } => Some(*operation),
            FsError::PermissionNotChangeable { .. } => Some(FileOperation::ChangePermission),
            _ => None,
        }
    }

    /// Returns `true` for [`NotFound`](FsError::NotFound).
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }

    /// Returns `true` for transport-level failures a caller may choose to retry.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FsError::Io { .. } | FsError::Backend(_))
    }

    /// Wrap an `io::Error`, keeping `NotFound` and `AlreadyExists` distinct.
    pub fn io(operation: &'static str, url: &FileUrl, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound { url: url.clone() },
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists {
                url: url.clone(),
                operation,
            },
            _ => FsError::Io {
                operation,
                url: url.clone(),
                source,
            },
        }
    }

    /// Convert into an `io::Error`, for use inside `Read`/`Write` implementations.
    pub fn into_io(self) -> std::io::Error {
        match self {
            FsError::Io { source, .. } => source,
            FsError::NotFound { .. } => std::io::Error::new(std::io::ErrorKind::NotFound, self),
            other => std::io::Error::other(other),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        let url = FileUrl::local("/");
        FsError::io("io", &url, error)
    }
}
