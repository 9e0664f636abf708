//! # Capability Markers
//!
//! Compile-time declaration of the operations a concrete entity type supports.
//!
//! ## Overview
//!
//! Every concrete [`FileEntity`](crate::FileEntity) type implements
//! [`Capabilities`], naming in a constant the operations it genuinely
//! implements. The capability of a type can then be queried without an
//! instance and without I/O:
//!
//! ```rust
//! use unifs::{Capabilities, FileOperation, OperationSet, is_operation_supported};
//!
//! struct ReadOnlyEntry;
//!
//! impl Capabilities for ReadOnlyEntry {
//!     const OPERATIONS: OperationSet = OperationSet::of(&[FileOperation::ReadFile]);
//! }
//!
//! assert!(is_operation_supported::<ReadOnlyEntry>(FileOperation::ReadFile));
//! assert!(!is_operation_supported::<ReadOnlyEntry>(FileOperation::Delete));
//! ```
//!
//! The `FileEntity` implementation of such a type returns the same constant
//! from `supported_operations`, and leaves every other operation method to
//! its unsupported default.
//!
//! Wrapper types whose capabilities depend on the wrapped entity (see
//! [`ProxyFile`](crate::ProxyFile)) do not implement this trait; they answer
//! per instance.

use crate::{FileOperation, OperationSet};

/// Static capability declaration of a concrete entity type.
pub trait Capabilities {
    /// Operations the type genuinely implements.
    const OPERATIONS: OperationSet;
}

/// Returns `true` if entity type `T` genuinely implements `op`.
///
/// A pure constant lookup; never performs I/O.
#[inline]
pub const fn is_operation_supported<T: Capabilities + ?Sized>(op: FileOperation) -> bool {
    T::OPERATIONS.contains(op)
}
