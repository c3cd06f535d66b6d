//! The single reader thread: demultiplexes a TPX3 byte stream into
//! per-chip buffer pools.

use std::io::{self, Read};
use std::sync::Arc;

use rustpix_iobuf::BufferPool;
use rustpix_tpx::{ChunkHeader, PacketId};

use crate::context::RunContext;
use crate::error::{Error, Result};

/// Reads one 8-byte header word, returning `Ok(false)` on a clean EOF at
/// a word boundary (graceful stream end) and `Err` on a short read
/// mid-word.
fn read_header_word(stream: &mut impl Read, buf: &mut [u8; 8]) -> io::Result<bool> {
    let mut total = 0;
    while total < buf.len() {
        let n = stream.read(&mut buf[total..])?;
        if n == 0 {
            if total == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short header read"));
        }
        total += n;
    }
    Ok(true)
}

/// Runs the reader loop against `stream` until a graceful EOF, a fatal
/// error, or `ctx.stop_now()`. Calls `finish_writing` on every pool
/// before returning, win or lose.
///
/// `has_packet_id` selects the server-protocol-3.20 framing (an extra
/// 8-byte packet-id word after every chunk header).
pub fn run_reader<R: Read>(
    mut stream: R,
    ctx: &RunContext,
    pools: &[Arc<BufferPool>],
    has_packet_id: bool,
) -> Result<()> {
    let result = run_reader_inner(&mut stream, ctx, pools, has_packet_id);
    for pool in pools {
        pool.finish_writing();
    }
    if let Err(ref e) = result {
        ctx.set_error(e.to_string());
    }
    result
}

fn run_reader_inner<R: Read>(
    stream: &mut R,
    ctx: &RunContext,
    pools: &[Arc<BufferPool>],
    has_packet_id: bool,
) -> Result<()> {
    let mut header_word = [0u8; 8];
    loop {
        if ctx.is_stopping() || ctx.is_collect_stopped() {
            return Ok(());
        }
        if !read_header_word(stream, &mut header_word)? {
            return Ok(());
        }
        let word0 = u64::from_le_bytes(header_word);
        let header = ChunkHeader::parse(word0)?;

        let packet_id = if has_packet_id {
            let mut pid_word = [0u8; 8];
            if !read_header_word(stream, &mut pid_word)? {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended before packet-id word",
                )));
            }
            PacketId::parse(u64::from_le_bytes(pid_word))?.0
        } else {
            0
        };

        let pool = pools.get(header.chip_id as usize).ok_or_else(|| {
            Error::CorruptStream {
                chip: header.chip_id as usize,
                detail: format!("chunk header names unconfigured chip {}", header.chip_id),
            }
        })?;

        let mut remaining = header.chunk_size as usize;
        let mut offset = 0usize;
        while remaining > 0 {
            let mut buf = pool.get_empty_buffer();
            let want = remaining.min(buf.capacity());
            buf.begin_chunk(offset, header.chunk_size as usize);
            while buf.content_size() < want {
                let n = stream.read(&mut buf.spare_capacity_mut()[..want - buf.content_size()])?;
                if n == 0 {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated chunk payload",
                    )));
                }
                buf.advance(n);
            }
            pool.put_nonempty_buffer(packet_id, buf);
            offset += want;
            remaining -= want;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpix_iobuf::BufferPool;
    use rustpix_tpx::decoder::CHUNK_HEADER_MAGIC;

    fn header_word(chip_id: u8, chunk_size: u16) -> u64 {
        u64::from(CHUNK_HEADER_MAGIC) | (u64::from(chip_id) << 32) | (u64::from(chunk_size) << 48)
    }

    #[test]
    fn demuxes_a_single_chunk_to_the_right_chip() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_word(0, 8).to_le_bytes());
        bytes.extend_from_slice(&0xABCD_EF01_2345_6789u64.to_le_bytes());

        let ctx = crate::context::RunContext::new(
            crate::context::RunConfig::default(),
            0,
            1,
            100,
            rustpix_hist::PixelMap::empty(1),
        );
        let pools = vec![Arc::new(BufferPool::new(64))];
        run_reader(std::io::Cursor::new(bytes), &ctx, &pools, false).unwrap();

        let (packet_id, buf) = pools[0].get_nonempty_buffer().unwrap();
        assert_eq!(packet_id, 0);
        assert_eq!(buf.content_size(), 8);
    }

    #[test]
    fn clean_eof_at_header_boundary_is_graceful() {
        let ctx = crate::context::RunContext::new(
            crate::context::RunConfig::default(),
            0,
            1,
            100,
            rustpix_hist::PixelMap::empty(1),
        );
        let pools = vec![Arc::new(BufferPool::new(64))];
        let result = run_reader(std::io::Cursor::new(Vec::new()), &ctx, &pools, false);
        assert!(result.is_ok());
        assert!(pools[0].is_finished());
    }

    #[test]
    fn truncated_chunk_is_an_io_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_word(0, 16).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);

        let ctx = crate::context::RunContext::new(
            crate::context::RunConfig::default(),
            0,
            1,
            100,
            rustpix_hist::PixelMap::empty(1),
        );
        let pools = vec![Arc::new(BufferPool::new(64))];
        let result = run_reader(std::io::Cursor::new(bytes), &ctx, &pools, false);
        assert!(result.is_err());
        assert!(ctx.is_stopping());
    }
}
