//! The IO buffer type moved between the reader and analyser threads.

/// A fixed-capacity byte buffer carrying one piece of a chunk's payload.
#[derive(Debug, Clone)]
pub struct IoBuffer {
    data: Vec<u8>,
    content_size: usize,
    content_offset: usize,
    chunk_size: usize,
}

impl IoBuffer {
    /// Allocates a new buffer of `capacity` bytes, empty of content.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            content_size: 0,
            content_offset: 0,
            chunk_size: 0,
        }
    }

    /// Total byte capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes currently held.
    #[must_use]
    pub fn content_size(&self) -> usize {
        self.content_size
    }

    /// Offset within the chunk this buffer's content begins at.
    #[must_use]
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// Byte length of the chunk this buffer is a piece of.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Marks this buffer as belonging to a chunk at `content_offset`
    /// within a chunk of `chunk_size` bytes, and clears its content.
    pub fn begin_chunk(&mut self, content_offset: usize, chunk_size: usize) {
        self.content_offset = content_offset;
        self.chunk_size = chunk_size;
        self.content_size = 0;
    }

    /// The writable slice for the reader to fill via its next `recv`.
    pub fn spare_capacity_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.content_size..]
    }

    /// Records that `n` more bytes were written into the buffer.
    pub fn advance(&mut self, n: usize) {
        self.content_size += n;
        debug_assert!(self.content_size <= self.data.len());
    }

    /// The valid content as a read-only slice.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.data[..self.content_size]
    }

    /// Resets a buffer back to empty before returning it to a free list.
    pub fn reset(&mut self) {
        self.content_size = 0;
        self.content_offset = 0;
        self.chunk_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_has_no_content() {
        let buf = IoBuffer::new(64);
        assert_eq!(buf.content_size(), 0);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn advance_tracks_written_bytes() {
        let mut buf = IoBuffer::new(16);
        buf.begin_chunk(0, 16);
        buf.spare_capacity_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        buf.advance(4);
        assert_eq!(buf.content(), &[1, 2, 3, 4]);
    }

    #[test]
    fn reset_clears_content_and_framing() {
        let mut buf = IoBuffer::new(8);
        buf.begin_chunk(8, 32);
        buf.advance(4);
        buf.reset();
        assert_eq!(buf.content_size(), 0);
        assert_eq!(buf.content_offset(), 0);
        assert_eq!(buf.chunk_size(), 0);
    }
}
