//! Fixed-capacity chunked input stream.
//!
//! Each refill reads up to `capacity` bytes and then gives back the tail
//! after the last complete scope delimiter, so the next refill starts on a
//! scope boundary and no consumer ever sees `ENDSCOPE\n` split across two
//! chunks.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::trace;

use super::format::{DEFAULT_CHUNK_CAPACITY, MIN_CHUNK_CAPACITY, SCOPE_DELIMITER};
use super::search::{partial_suffix_len, rfind_end};
use crate::util::{Error, Result};

/// Forward-only reader handing out delimiter-aligned chunks.
pub struct ChunkedScopeStream<R> {
    inner: R,
    buf: Vec<u8>,
    valid: usize,
    /// Absolute offset of `buf[0]`.
    chunk_offset: u64,
    /// Absolute offset the next refill reads from.
    next_offset: u64,
    exhausted: bool,
}

impl ChunkedScopeStream<File> {
    /// Open a file with the default chunk capacity.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_CHUNK_CAPACITY)
    }

    /// Open a file with a custom chunk capacity.
    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let file = open_file(path.as_ref())?;
        Self::with_capacity(file, capacity)
    }

    /// Switch to another file. The previous handle is closed first.
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = open_file(path.as_ref())?;
        self.inner = file;
        self.reset();
        Ok(())
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

impl<R: Read + Seek> ChunkedScopeStream<R> {
    /// Wrap a seekable reader positioned at the start of a DAS file.
    pub fn with_capacity(inner: R, capacity: usize) -> Result<Self> {
        if capacity < MIN_CHUNK_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "chunk capacity {} is below the minimum of {} bytes",
                capacity, MIN_CHUNK_CAPACITY
            )));
        }
        Ok(Self {
            inner,
            buf: vec![0; capacity],
            valid: 0,
            chunk_offset: 0,
            next_offset: 0,
            exhausted: false,
        })
    }

    fn reset(&mut self) {
        self.valid = 0;
        self.chunk_offset = 0;
        self.next_offset = 0;
        self.exhausted = false;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Valid bytes of the current chunk.
    #[inline]
    pub fn buffer_view(&self) -> &[u8] {
        &self.buf[..self.valid]
    }

    /// Absolute offset of the current chunk's first byte.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.chunk_offset
    }

    /// True once a refill has hit the end of the underlying reader.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Load the next chunk. Returns `false` at end of stream.
    pub fn read_chunk(&mut self) -> Result<bool> {
        self.chunk_offset = self.next_offset;
        self.valid = 0;
        if self.exhausted {
            return Ok(false);
        }

        let filled = self.fill()?;
        if filled == 0 {
            self.exhausted = true;
            return Ok(false);
        }

        // A short read means everything left in the file is in the window.
        let keep = if filled < self.buf.len() {
            self.exhausted = true;
            filled
        } else {
            chunk_boundary(&self.buf[..filled], SCOPE_DELIMITER)
        };

        let rewind = filled - keep;
        if rewind > 0 {
            self.inner
                .seek(SeekFrom::Current(-(rewind as i64)))
                .map_err(|source| Error::ReadFailed {
                    offset: self.chunk_offset + keep as u64,
                    source,
                })?;
        }

        self.valid = keep;
        self.next_offset = self.chunk_offset + keep as u64;
        trace!(
            offset = self.chunk_offset,
            len = keep,
            rewind,
            "chunk loaded"
        );
        Ok(true)
    }

    /// Read until the buffer is full or the reader is exhausted.
    fn fill(&mut self) -> Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::ReadFailed {
                        offset: self.chunk_offset + filled as u64,
                        source,
                    })
                }
            }
        }
        Ok(filled)
    }
}

/// Number of leading bytes of a full window to keep so that it ends on a
/// delimiter boundary.
///
/// * last complete delimiter found: keep through its end;
/// * tail is a partial delimiter: drop the partial match so the next chunk
///   starts with the whole delimiter;
/// * otherwise keep everything.
///
/// Never returns 0 for a non-empty window.
pub fn chunk_boundary(window: &[u8], delimiter: &[u8]) -> usize {
    if let Some(end) = rfind_end(window, delimiter) {
        return end;
    }
    let partial = partial_suffix_len(window, delimiter);
    if partial > 0 && partial < window.len() {
        window.len() - partial
    } else {
        window.len()
    }
}
