//! Memory-mapped offline capture reading.
//!
//! Superseded as the live ingestion path by `rustpix-handler`'s TCP
//! reader thread; kept for fixture-driven tests and the `tools/`
//! diagnostics binary, both of which want to walk a recorded capture
//! without standing up the full threaded pipeline.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use rustpix_tpx::ChunkHeader;

use crate::Result;

/// A memory-mapped file, exposed as raw bytes.
pub struct MappedFileReader {
    mmap: Mmap,
}

impl MappedFileReader {
    /// Opens `path` for memory-mapped reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is not expected to be concurrently truncated by
        // another process during the reader's lifetime.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    /// The mapped file's contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// The mapped file's size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// True if the mapped file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Walks the capture's chunk headers, yielding each chunk's chip id
    /// alongside the 8-byte words in its body (header and packet-id
    /// words excluded). No reordering, predictor, or histogram logic is
    /// applied; this is a raw single-pass demultiplex for diagnostics.
    #[must_use]
    pub fn chunks(&self) -> ChunkWords<'_> {
        ChunkWords { data: &self.mmap, offset: 0, current: None }
    }
}

/// Iterator over `(chip_id, word)` pairs produced by [`MappedFileReader::chunks`].
pub struct ChunkWords<'a> {
    data: &'a [u8],
    offset: usize,
    /// `(chip_id, end_offset)` of the chunk body currently being walked.
    current: Option<(u8, usize)>,
}

impl<'a> Iterator for ChunkWords<'a> {
    type Item = (u8, u64);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((chip_id, body_end)) = self.current {
                if self.offset < body_end {
                    let word = read_word(self.data, self.offset);
                    self.offset += 8;
                    return Some((chip_id, word));
                }
                self.current = None;
            }
            if self.offset + 8 > self.data.len() {
                return None;
            }
            let word = read_word(self.data, self.offset);
            let Ok(header) = ChunkHeader::parse(word) else {
                // no header at this boundary: skip one word and keep scanning.
                self.offset += 8;
                continue;
            };
            self.offset += 8;
            let body_end = self.offset + header.chunk_size as usize;
            if body_end > self.data.len() {
                return None;
            }
            self.current = Some((header.chip_id, body_end));
        }
    }
}

fn read_word(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().expect("8-byte slice"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpix_tpx::decoder::CHUNK_HEADER_MAGIC;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header_word(chip_id: u8, chunk_size: u16) -> u64 {
        u64::from(CHUNK_HEADER_MAGIC) | (u64::from(chip_id) << 32) | (u64::from(chunk_size) << 48)
    }

    #[test]
    fn mapped_file_reader_exposes_raw_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..64).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 64);
        assert!(!reader.is_empty());
        assert_eq!(reader.as_bytes(), &data[..]);
    }

    #[test]
    fn chunks_demultiplexes_two_chips() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_word(0, 8).to_le_bytes());
        bytes.extend_from_slice(&0x1111_1111_1111_1111u64.to_le_bytes());
        bytes.extend_from_slice(&header_word(1, 8).to_le_bytes());
        bytes.extend_from_slice(&0x2222_2222_2222_2222u64.to_le_bytes());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        let words: Vec<(u8, u64)> = reader.chunks().collect();
        assert_eq!(words, vec![(0, 0x1111_1111_1111_1111), (1, 0x2222_2222_2222_2222)]);
    }

    #[test]
    fn chunks_on_empty_file_yields_nothing() {
        let file = NamedTempFile::new().unwrap();
        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.chunks().count(), 0);
    }
}
