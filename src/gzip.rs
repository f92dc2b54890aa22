//! Single-member gzip framing over the DEFLATE codec layer.
//!
//! A gzip file is a 10-byte header (plus optional file name and
//! comment), a raw DEFLATE body, and an 8-byte trailer carrying the
//! CRC-32 and the uncompressed size modulo 2³². [`GzipWriter`] and
//! [`GzipReader`] produce and consume that framing; only the
//! single-member form is supported.

use std::io::{self, Read, Write};

use log::*;

use crate::flate::{Deflater, Inflater};
use crate::result::*;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
/// The only compression method gzip ever standardized
const METHOD_DEFLATE: u8 = 8;
/// Header length before the optional fields
const HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

// Header flag bits, RFC 1952 section 2.3.1.
const FLAG_TEXT: u8 = 1 << 0;
const FLAG_HEADER_CRC: u8 = 1 << 1;
const FLAG_EXTRA: u8 = 1 << 2;
const FLAG_NAME: u8 = 1 << 3;
const FLAG_COMMENT: u8 = 1 << 4;
const FLAG_RESERVED: u8 = 0xE0;

/// "Unknown" in the header's OS field
const OS_UNKNOWN: u8 = 255;

/// Compresses a single gzip member into a lower sink.
///
/// The header goes out with the first written byte (so the optional
/// file name and comment can be set any time before that), and the
/// trailer with [`finish`](Self::finish).
pub struct GzipWriter<W: Write> {
    inner: W,
    deflater: Deflater,
    filename: Option<String>,
    comment: Option<String>,
    mtime: u32,
    header_written: bool,
    finished: bool,
}

impl<W: Write> GzipWriter<W> {
    /// Compresses at the default level (6).
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, 6)
    }

    pub fn with_level(inner: W, level: u32) -> Self {
        Self {
            inner,
            deflater: Deflater::new(level),
            filename: None,
            comment: None,
            mtime: 0,
            header_written: false,
            finished: false,
        }
    }

    /// Records the original file name in the member header.
    /// Must be called before the first write.
    pub fn set_filename(&mut self, filename: impl Into<String>) -> ZipResult<()> {
        if self.header_written {
            return Err(ZipError::InvalidState("gzip header already written"));
        }
        self.filename = Some(filename.into());
        Ok(())
    }

    /// Records a comment in the member header.
    /// Must be called before the first write.
    pub fn set_comment(&mut self, comment: impl Into<String>) -> ZipResult<()> {
        if self.header_written {
            return Err(ZipError::InvalidState("gzip header already written"));
        }
        self.comment = Some(comment.into());
        Ok(())
    }

    /// Records the modification time (seconds since the Unix epoch) in
    /// the member header. Must be called before the first write.
    pub fn set_mtime(&mut self, mtime: u32) -> ZipResult<()> {
        if self.header_written {
            return Err(ZipError::InvalidState("gzip header already written"));
        }
        self.mtime = mtime;
        Ok(())
    }

    fn write_header(&mut self) -> ZipResult<()> {
        if self.header_written {
            return Ok(());
        }
        let mut flags = 0u8;
        if self.filename.is_some() {
            flags |= FLAG_NAME;
        }
        if self.comment.is_some() {
            flags |= FLAG_COMMENT;
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&GZIP_MAGIC);
        header.push(METHOD_DEFLATE);
        header.push(flags);
        header.extend_from_slice(&self.mtime.to_le_bytes());
        header.push(0); // extra flags: no hints about the level
        header.push(OS_UNKNOWN);
        for text in [self.filename.as_ref(), self.comment.as_ref()]
            .into_iter()
            .flatten()
        {
            header.extend_from_slice(text.as_bytes());
            header.push(0);
        }

        self.inner.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Closes the DEFLATE stream and writes the trailer. An empty
    /// member (header and trailer, no payload bytes) is still valid.
    pub fn finish(&mut self) -> ZipResult<()> {
        if self.finished {
            return Ok(());
        }
        self.write_header()?;
        self.deflater.finish(&mut self.inner)?;

        let mut trailer = [0u8; TRAILER_LEN];
        trailer[..4].copy_from_slice(&self.deflater.crc32().to_le_bytes());
        let size_mod = self.deflater.uncompressed_size() as u32;
        trailer[4..].copy_from_slice(&size_mod.to_le_bytes());
        self.inner.write_all(&trailer)?;
        self.inner.flush()?;

        self.finished = true;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for GzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "gzip member is already finished",
            ));
        }
        self.write_header().map_err(io::Error::from)?;
        self.deflater
            .write_some(&mut self.inner, buf)
            .map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_header().map_err(io::Error::from)?;
        self.deflater.sync(&mut self.inner).map_err(io::Error::from)?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for GzipWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                warn!("Couldn't finish gzip member on drop: {e}");
            }
        }
    }
}

/// Reads a zero-terminated header field.
fn read_cstring<R: Read>(reader: &mut R) -> ZipResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut one = [0u8; 1];
    loop {
        reader.read_exact(&mut one)?;
        if one[0] == 0 {
            return Ok(bytes);
        }
        bytes.push(one[0]);
    }
}

/// Decompresses a single gzip member from a lower source.
///
/// The header is parsed on construction; the trailer is read and
/// verified when the DEFLATE stream ends, so a fully drained reader
/// guarantees the CRC-32 and size matched.
pub struct GzipReader<R: Read> {
    inner: R,
    inflater: Inflater,
    filename: Option<String>,
    comment: Option<String>,
    mtime: u32,
    trailer_checked: bool,
}

impl<R: Read> GzipReader<R> {
    pub fn new(mut inner: R) -> ZipResult<Self> {
        let mut header = [0u8; HEADER_LEN];
        inner.read_exact(&mut header)?;
        if header[..2] != GZIP_MAGIC {
            return Err(ZipError::InvalidArchive("Not a gzip file"));
        }
        if header[2] != METHOD_DEFLATE {
            return Err(ZipError::UnsupportedArchive(format!(
                "Unsupported gzip compression method {}",
                header[2]
            )));
        }
        let flags = header[3];
        if flags & FLAG_RESERVED != 0 {
            return Err(ZipError::InvalidArchive("Reserved gzip header flags set"));
        }
        if flags & FLAG_TEXT != 0 {
            trace!("Member claims to be text; treating it as binary anyway");
        }
        let mtime = u32::from_le_bytes(header[4..8].try_into().expect("four bytes for mtime"));

        if flags & FLAG_EXTRA != 0 {
            let mut len = [0u8; 2];
            inner.read_exact(&mut len)?;
            let mut extra = vec![0; u16::from_le_bytes(len) as usize];
            inner.read_exact(&mut extra)?;
        }
        let filename = if flags & FLAG_NAME != 0 {
            Some(String::from_utf8_lossy(&read_cstring(&mut inner)?).into_owned())
        } else {
            None
        };
        let comment = if flags & FLAG_COMMENT != 0 {
            Some(String::from_utf8_lossy(&read_cstring(&mut inner)?).into_owned())
        } else {
            None
        };
        if flags & FLAG_HEADER_CRC != 0 {
            let mut crc16 = [0u8; 2];
            inner.read_exact(&mut crc16)?;
        }

        Ok(Self {
            inner,
            inflater: Inflater::new(),
            filename,
            comment,
            mtime,
            trailer_checked: false,
        })
    }

    /// The original file name from the member header, if present
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The comment from the member header, if present
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The modification time from the member header
    /// (seconds since the Unix epoch; zero if unset)
    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    /// Reads and verifies the trailer once the body is done. The first
    /// trailer bytes usually sit in the inflater's staging buffer
    /// already, so this never needs to seek.
    fn check_trailer(&mut self) -> ZipResult<()> {
        if self.trailer_checked {
            return Ok(());
        }
        self.trailer_checked = true;

        let mut trailer = [0u8; TRAILER_LEN];
        let staged = self.inflater.leftover().len().min(TRAILER_LEN);
        trailer[..staged].copy_from_slice(&self.inflater.leftover()[..staged]);
        self.inflater.consume_leftover(staged);
        self.inner.read_exact(&mut trailer[staged..])?;

        let crc32 = u32::from_le_bytes(trailer[..4].try_into().expect("four bytes for crc32"));
        let size_mod = u32::from_le_bytes(trailer[4..].try_into().expect("four bytes for size"));
        if crc32 != self.inflater.crc32() {
            return Err(ZipError::InvalidArchive("Gzip CRC-32 mismatch"));
        }
        if size_mod != self.inflater.bytes_produced() as u32 {
            return Err(ZipError::InvalidArchive("Gzip size mismatch"));
        }
        Ok(())
    }
}

impl<R: Read> Read for GzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let got = self
            .inflater
            .read_some(&mut self.inner, buf)
            .map_err(io::Error::from)?;
        if got == 0 && self.inflater.is_stream_end() {
            self.check_trailer().map_err(io::Error::from)?;
        }
        Ok(got)
    }
}
