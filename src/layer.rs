//! # Layer Trait
//!
//! Tower-style composition of file entity wrappers.
//!
//! ## Overview
//!
//! A [`Layer`] turns a [`FileRef`] into a wrapped entity. Every
//! [`ProxyHooks`] implementation is a layer producing a [`ProxyFile`], so a
//! wrapper is written once as hooks and applied fluently:
//!
//! ```text
//! FileRef ──▶ Layer::layer() ──▶ wrapped FileRef
//! ```
//!
//! ## Example
//!
//! ```rust
//! use unifs::{FileRef, LayerExt, ReadOnly};
//!
//! fn freeze(file: FileRef) -> FileRef {
//!     file.layer(ReadOnly)
//! }
//! ```

use std::sync::Arc;

use crate::{FileEntity, FileRef, ProxyFile, ProxyHooks};

/// A layer that wraps a file entity.
///
/// `layer(self, file)` consumes the layer configuration. The result is a
/// concrete entity type; [`LayerExt::layer`] erases it back to a [`FileRef`].
pub trait Layer {
    /// The wrapped entity type.
    type Wrapped: FileEntity + 'static;

    /// Wrap `file` with this layer's behavior.
    fn layer(self, file: FileRef) -> Self::Wrapped;
}

impl<H: ProxyHooks + 'static> Layer for H {
    type Wrapped = ProxyFile<H>;

    fn layer(self, file: FileRef) -> ProxyFile<H> {
        ProxyFile::new(file, self)
    }
}

/// Extension trait for fluent layer composition on [`FileRef`].
pub trait LayerExt {
    /// Apply a layer and return the wrapped entity as a [`FileRef`].
    fn layer<L: Layer>(self, layer: L) -> FileRef;
}

impl LayerExt for FileRef {
    fn layer<L: Layer>(self, layer: L) -> FileRef {
        Arc::new(layer.layer(self))
    }
}
