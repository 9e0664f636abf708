//! Writers that buffer their content and upload it in one call.

use std::fmt;
use std::io::{self, Write};

use crate::FsResult;

/// Buffers written bytes and hands the whole content to an upload function
/// on [`flush`](Write::flush), or on drop if unflushed data remains.
///
/// Errors of an upload triggered by drop can only be logged; call `flush`
/// to observe them.
pub(crate) struct StagedWriter<F>
where
    F: FnMut(&[u8]) -> FsResult<()> + Send,
{
    buffer: Vec<u8>,
    dirty: bool,
    upload: F,
}

impl<F> StagedWriter<F>
where
    F: FnMut(&[u8]) -> FsResult<()> + Send,
{
    /// Writer replacing the target content on upload. Starts dirty so that
    /// an empty write still creates the target.
    pub(crate) fn new(upload: F) -> Self {
        Self {
            buffer: Vec::new(),
            dirty: true,
            upload,
        }
    }
}

impl<F> Write for StagedWriter<F>
where
    F: FnMut(&[u8]) -> FsResult<()> + Send,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            (self.upload)(&self.buffer).map_err(crate::FsError::into_io)?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl<F> Drop for StagedWriter<F>
where
    F: FnMut(&[u8]) -> FsResult<()> + Send,
{
    fn drop(&mut self) {
        if self.dirty {
            if let Err(error) = (self.upload)(&self.buffer) {
                tracing::warn!(%error, bytes = self.buffer.len(), "upload on close failed");
            }
        }
    }
}

impl<F> fmt::Debug for StagedWriter<F>
where
    F: FnMut(&[u8]) -> FsResult<()> + Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedWriter")
            .field("bytes", &self.buffer.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
