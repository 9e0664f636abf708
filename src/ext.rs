//! # Extension Traits
//!
//! Convenience methods for file entities.
//!
//! ## Overview
//!
//! [`FileEntityExt`] provides commonly-needed helpers built only on the
//! [`FileEntity`] operations. It is blanket-implemented, so every entity
//! (including `dyn FileEntity`) gets it for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`ensure_supported`](FileEntityExt::ensure_supported) | Fail fast on an absent capability |
//! | [`read_to_vec`](FileEntityExt::read_to_vec) | Read the whole contents |
//! | [`write_bytes`](FileEntityExt::write_bytes) | Replace the contents |
//! | [`child_named`](FileEntityExt::child_named) | Look a child up by name |
//! | [`delete_recursively`](FileEntityExt::delete_recursively) | Delete a directory tree |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, [`FileEntityExtJson`] adds `read_json`
//! and `write_json`.

use std::io::{Read, Write};

use crate::{FileEntity, FileOperation, FileRef, FsError, FsResult};

/// Extension methods for any file entity.
///
/// # Example
///
/// ```rust
/// use unifs::{FileEntity, FileEntityExt, FileOperation, FsResult};
///
/// fn load(file: &dyn FileEntity) -> FsResult<Vec<u8>> {
///     file.ensure_supported(FileOperation::ReadFile)?;
///     file.read_to_vec()
/// }
/// ```
pub trait FileEntityExt: FileEntity {
    /// Fail with [`FsError::UnsupportedOperation`] unless `op` is advertised.
    ///
    /// Never performs I/O.
    fn ensure_supported(&self, op: FileOperation) -> FsResult<()> {
        if self.is_operation_supported(op) {
            Ok(())
        } else {
            Err(FsError::unsupported(op))
        }
    }

    /// Read the whole contents into memory.
    fn read_to_vec(&self) -> FsResult<Vec<u8>> {
        let mut reader = self.open_read()?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| FsError::io("read", self.url(), e))?;
        Ok(data)
    }

    /// Replace the contents with `data`.
    ///
    /// The writer is flushed and dropped before returning, so staged backends
    /// have committed by then.
    fn write_bytes(&self, data: &[u8]) -> FsResult<()> {
        let mut writer = self.open_write()?;
        writer
            .write_all(data)
            .and_then(|()| writer.flush())
            .map_err(|e| FsError::io("write", self.url(), e))
    }

    /// The child called `name`, if listing finds one.
    ///
    /// Names are compared with the entity's case sensitivity.
    fn child_named(&self, name: &str) -> FsResult<Option<FileRef>> {
        let case_sensitive = self.url().is_case_sensitive();
        Ok(self.ls()?.into_iter().find(|child| {
            if case_sensitive {
                child.name() == name
            } else {
                child.name().eq_ignore_ascii_case(name)
            }
        }))
    }

    /// Delete the entity, deleting the children of a directory first.
    ///
    /// Only real directories are descended; browsable files such as archives
    /// are deleted as files. Symbolic links are never followed.
    fn delete_recursively(&self) -> FsResult<()> {
        if self.is_directory() && !self.is_symlink() {
            for child in self.ls()? {
                child.delete_recursively()?;
            }
        }
        self.delete()
    }
}

impl<T: FileEntity + ?Sized> FileEntityExt for T {}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FileEntityExtJson: FileEntity {
        /// Read the contents and deserialize them as JSON.
        ///
        /// # Errors
        ///
        /// - `FsError::Deserialization` if the contents are not valid JSON for `T`
        fn read_json<T: DeserializeOwned>(&self) -> FsResult<T> {
            let data = self.read_to_vec()?;
            serde_json::from_slice(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize `value` as pretty-printed JSON and replace the contents.
        fn write_json<T: Serialize>(&self, value: &T) -> FsResult<()> {
            let json = serde_json::to_vec_pretty(value)
                .map_err(|e| FsError::Serialization(e.to_string()))?;
            self.write_bytes(&json)
        }
    }

    impl<E: FileEntity + ?Sized> FileEntityExtJson for E {}
}

#[cfg(feature = "serde")]
pub use json::FileEntityExtJson;
