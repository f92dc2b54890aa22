//! The streaming codec layer: raw DEFLATE compression and
//! decompression adapted to byte-stream reads and writes.
//!
//! [`Inflater`] and [`Deflater`] are value-typed codec states that
//! borrow their lower source or sink one call at a time; the archive
//! reader and writer drive them directly so the same state can be
//! reset and reused across entries. [`InflateReader`] and
//! [`DeflateWriter`] wrap them up with an owned source/sink for
//! standalone use.

use std::io::{self, Read, Write};

use crc32fast::Hasher;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::*;

use crate::result::*;

/// Staging buffer for compressed bytes pulled from the source.
const STAGE_LEN: usize = 4096;

/// Scratch buffer for compressed bytes headed to the sink.
const SCRATCH_LEN: usize = 4096;

fn compress_failure(err: flate2::CompressError) -> ZipError {
    ZipError::Io(io::Error::new(io::ErrorKind::Other, err))
}

/// Pull-based DEFLATE decoder state.
///
/// Reads compressed bytes from a lower source into a staging buffer,
/// inflates into the caller's buffer, and keeps a running CRC-32 of
/// everything it emits. Decoding stops at the natural end of the
/// DEFLATE stream no matter how many source bytes remain, which is
/// what lets consecutive archive entries share one source.
pub(crate) struct Inflater {
    decoder: Decompress,
    staged: Box<[u8]>,
    start: usize,
    end: usize,
    stream_end: bool,
    hasher: Hasher,
    produced: u64,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            decoder: Decompress::new(false),
            staged: vec![0; STAGE_LEN].into_boxed_slice(),
            start: 0,
            end: 0,
            stream_end: false,
            hasher: Hasher::new(),
            produced: 0,
        }
    }

    /// Reinitializes the decoder for a fresh DEFLATE stream starting at
    /// the source's current position. Staged bytes from the previous
    /// stream are discarded.
    pub fn reset(&mut self) {
        self.decoder.reset(false);
        self.start = 0;
        self.end = 0;
        self.stream_end = false;
        self.hasher = Hasher::new();
        self.produced = 0;
    }

    /// Inflates some bytes into `buf`, pulling more compressed data
    /// from `source` as needed. Returns 0 only at the end of the
    /// DEFLATE stream (or for an empty `buf`).
    pub fn read_some<R: Read>(&mut self, source: &mut R, buf: &mut [u8]) -> ZipResult<usize> {
        if buf.is_empty() || self.stream_end {
            return Ok(0);
        }
        loop {
            if self.start == self.end {
                self.start = 0;
                self.end = source.read(&mut self.staged[..])?;
            }
            let exhausted = self.start == self.end;
            let flush = if exhausted {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };

            let before_in = self.decoder.total_in();
            let before_out = self.decoder.total_out();
            let status = self
                .decoder
                .decompress(&self.staged[self.start..self.end], buf, flush)
                .map_err(|_| ZipError::InvalidArchive("Corrupt deflate stream"))?;
            let consumed = (self.decoder.total_in() - before_in) as usize;
            let emitted = (self.decoder.total_out() - before_out) as usize;
            self.start += consumed;
            self.hasher.update(&buf[..emitted]);
            self.produced += emitted as u64;

            match status {
                Status::StreamEnd => {
                    self.stream_end = true;
                    return Ok(emitted);
                }
                _ if emitted > 0 => return Ok(emitted),
                _ if exhausted => {
                    return Err(ZipError::InvalidArchive("Unexpected end of deflate stream"))
                }
                _ if consumed == 0 => {
                    return Err(ZipError::InvalidArchive("Deflate stream made no progress"))
                }
                _ => continue,
            }
        }
    }

    /// True once the decoder has seen the final block of its stream.
    pub fn is_stream_end(&self) -> bool {
        self.stream_end
    }

    /// CRC-32 of all bytes emitted since the last reset
    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Number of bytes emitted since the last reset
    pub fn bytes_produced(&self) -> u64 {
        self.produced
    }

    /// Staged source bytes the decoder did not consume. After stream
    /// end these are the bytes immediately following the compressed
    /// payload; framing layers (the gzip trailer) read from here
    /// before touching the source again.
    pub fn leftover(&self) -> &[u8] {
        &self.staged[self.start..self.end]
    }

    /// Discards `n` bytes of [`leftover`](Self::leftover).
    pub fn consume_leftover(&mut self, n: usize) {
        debug_assert!(n <= self.end - self.start);
        self.start += n;
    }
}

/// Push-based DEFLATE encoder state.
///
/// Compresses bytes written to it and forwards the compressed stream
/// to a lower sink, tracking the CRC-32 and both byte counts. After
/// [`finish`](Self::finish), the counters describe exactly the bytes
/// offered and emitted; the archive writer back-patches headers from
/// them.
pub(crate) struct Deflater {
    encoder: Compress,
    scratch: Box<[u8]>,
    hasher: Hasher,
    uncompressed: u64,
    compressed: u64,
    finished: bool,
}

impl Deflater {
    /// Creates an encoder with the given compression level (1-9).
    pub fn new(level: u32) -> Self {
        Self {
            encoder: Compress::new(Compression::new(level.clamp(1, 9)), false),
            scratch: vec![0; SCRATCH_LEN].into_boxed_slice(),
            hasher: Hasher::new(),
            uncompressed: 0,
            compressed: 0,
            finished: false,
        }
    }

    /// Compresses all of `buf`, writing whatever compressed bytes fall
    /// out to `sink`.
    pub fn write_some<W: Write>(&mut self, sink: &mut W, mut buf: &[u8]) -> ZipResult<usize> {
        if self.finished {
            return Err(ZipError::InvalidState("write into a finished deflate stream"));
        }
        let total = buf.len();
        while !buf.is_empty() {
            let before_in = self.encoder.total_in();
            let before_out = self.encoder.total_out();
            self.encoder
                .compress(buf, &mut self.scratch, FlushCompress::None)
                .map_err(compress_failure)?;
            let consumed = (self.encoder.total_in() - before_in) as usize;
            let emitted = (self.encoder.total_out() - before_out) as usize;
            sink.write_all(&self.scratch[..emitted])?;
            self.hasher.update(&buf[..consumed]);
            self.uncompressed += consumed as u64;
            self.compressed += emitted as u64;
            buf = &buf[consumed..];
        }
        Ok(total)
    }

    /// Partially flushes the encoder: after this returns, everything
    /// offered so far is represented in the sink, but the DEFLATE
    /// stream remains open for more data.
    pub fn sync<W: Write>(&mut self, sink: &mut W) -> ZipResult<()> {
        if self.finished {
            return Ok(());
        }
        loop {
            let before_out = self.encoder.total_out();
            self.encoder
                .compress(&[], &mut self.scratch, FlushCompress::Sync)
                .map_err(compress_failure)?;
            let emitted = (self.encoder.total_out() - before_out) as usize;
            sink.write_all(&self.scratch[..emitted])?;
            self.compressed += emitted as u64;
            // A full scratch buffer means the flush may have more to say.
            if emitted < self.scratch.len() {
                return Ok(());
            }
        }
    }

    /// Closes the DEFLATE stream, writing the final block to the sink.
    /// Subsequent writes are an error; `finish` itself is idempotent.
    pub fn finish<W: Write>(&mut self, sink: &mut W) -> ZipResult<()> {
        if self.finished {
            return Ok(());
        }
        loop {
            let before_out = self.encoder.total_out();
            let status = self
                .encoder
                .compress(&[], &mut self.scratch, FlushCompress::Finish)
                .map_err(compress_failure)?;
            let emitted = (self.encoder.total_out() - before_out) as usize;
            sink.write_all(&self.scratch[..emitted])?;
            self.compressed += emitted as u64;
            if matches!(status, Status::StreamEnd) {
                break;
            }
        }
        self.finished = true;
        Ok(())
    }

    /// CRC-32 of all bytes offered so far
    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Total uncompressed bytes offered so far
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed
    }

    /// Total compressed bytes emitted so far
    pub fn compressed_size(&self) -> u64 {
        self.compressed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// An `io::Read` adapter that inflates a raw DEFLATE stream from an
/// owned source, stopping at the stream's natural end.
pub struct InflateReader<R: Read> {
    inner: R,
    inflater: Inflater,
}

impl<R: Read> InflateReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            inflater: Inflater::new(),
        }
    }

    /// CRC-32 of the inflated bytes read so far
    pub fn crc32(&self) -> u32 {
        self.inflater.crc32()
    }

    /// Number of inflated bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.inflater.bytes_produced()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for InflateReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inflater
            .read_some(&mut self.inner, buf)
            .map_err(io::Error::from)
    }
}

/// An `io::Write` adapter that deflates written bytes into an owned
/// sink. The stream is closed by [`finish`](Self::finish) (or on drop,
/// where errors can only be logged).
pub struct DeflateWriter<W: Write> {
    inner: W,
    deflater: Deflater,
}

impl<W: Write> DeflateWriter<W> {
    /// Compresses at the default level (6).
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, 6)
    }

    pub fn with_level(inner: W, level: u32) -> Self {
        Self {
            inner,
            deflater: Deflater::new(level),
        }
    }

    /// Closes the DEFLATE stream and flushes the sink.
    pub fn finish(&mut self) -> ZipResult<()> {
        self.deflater.finish(&mut self.inner)?;
        self.inner.flush()?;
        Ok(())
    }

    /// CRC-32 of all bytes written so far
    pub fn crc32(&self) -> u32 {
        self.deflater.crc32()
    }

    /// Total uncompressed bytes written so far
    pub fn uncompressed_size(&self) -> u64 {
        self.deflater.uncompressed_size()
    }

    /// Total compressed bytes emitted so far
    pub fn compressed_size(&self) -> u64 {
        self.deflater.compressed_size()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for DeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.deflater
            .write_some(&mut self.inner, buf)
            .map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.deflater.sync(&mut self.inner).map_err(io::Error::from)?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for DeflateWriter<W> {
    fn drop(&mut self) {
        if !self.deflater.is_finished() {
            if let Err(e) = self.finish() {
                warn!("Couldn't finish deflate stream on drop: {e}");
            }
        }
    }
}
