//! Tools for reading a ZIP archive entry by entry.
//!
//! A [`ZipReader`] walks the local file headers of an archive in
//! order, exposing each entry's decompressed payload through
//! `io::Read`. Random access by name goes through
//! [`ZipCollection`](crate::collection::ZipCollection), which drives
//! one of these per opened entry.

use std::io::{self, Read, Seek, SeekFrom};

use crc32fast::Hasher;
use log::*;

use crate::entry::{CompressionMethod, ZipEntry};
use crate::flate::Inflater;
use crate::result::*;
use crate::spec;

/// The decoding state for the entry under the cursor.
enum EntryState {
    /// No entry is open.
    Idle,
    /// A STORED entry: `remain` payload bytes left to copy verbatim.
    Stored { remain: u32 },
    /// A DEFLATED entry, decoded by the inflater.
    Deflated,
    /// An entry we can't decode (unsupported method or a data
    /// descriptor). Reads yield EOF; the payload extent is still known
    /// so the walk can continue past it.
    Skipped,
}

/// Reads the entries of a ZIP archive in the order their local headers
/// appear.
///
/// After [`next_entry`](Self::next_entry) returns an entry, the reader
/// itself reads that entry's decompressed bytes. Moving on (via
/// `next_entry` or [`close_entry`](Self::close_entry)) repositions
/// the source past the entry's payload regardless of how much of it
/// was consumed.
pub struct ZipReader<R: Read + Seek> {
    inner: R,
    inflater: Inflater,
    state: EntryState,
    current: Option<ZipEntry>,
    data_start: u64,
    hasher: Hasher,
    crc_checked: bool,
}

impl<R: Read + Seek> ZipReader<R> {
    /// Starts reading local headers at the source's current position.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            inflater: Inflater::new(),
            state: EntryState::Idle,
            current: None,
            data_start: 0,
            hasher: Hasher::new(),
            crc_checked: false,
        }
    }

    /// Starts reading local headers at the given absolute position,
    /// e.g. an offset from a central directory record.
    pub fn with_position(mut inner: R, position: u64) -> ZipResult<Self> {
        inner.seek(SeekFrom::Start(position))?;
        Ok(Self::new(inner))
    }

    /// Advances to the next entry, implicitly closing the current one.
    ///
    /// Returns `None` once the cursor reaches the central directory
    /// (or EOF, for a bare stream of local entries). The returned
    /// entry is an owned copy; holding it does not pin the cursor.
    ///
    /// Entries with an unsupported compression method or a trailing
    /// data descriptor are still returned so callers can account for
    /// them, but reads on them yield EOF. Check
    /// [`ZipEntry::is_supported`] before expecting payload bytes.
    pub fn next_entry(&mut self) -> ZipResult<Option<ZipEntry>> {
        self.close_entry()?;

        let header_offset = self.inner.stream_position()?;
        let mut entry = match spec::read_local_entry(&mut self.inner)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        entry.header_offset = header_offset;
        trace!("{entry:?}");

        self.data_start = self.inner.stream_position()?;
        self.hasher = Hasher::new();
        self.crc_checked = false;
        self.state = if !entry.is_supported() {
            warn!(
                "Can't decode entry {}: unsupported storage format",
                entry.name
            );
            EntryState::Skipped
        } else {
            match entry.method {
                CompressionMethod::Stored => EntryState::Stored { remain: entry.size },
                CompressionMethod::Deflate => {
                    self.inflater.reset();
                    EntryState::Deflated
                }
                CompressionMethod::Unsupported(_) => unreachable!("checked by is_supported"),
            }
        };
        self.current = Some(entry.clone());
        Ok(Some(entry))
    }

    /// Closes the open entry (if any), seeking the source to the first
    /// byte past its compressed payload.
    pub fn close_entry(&mut self) -> ZipResult<()> {
        if let Some(entry) = self.current.take() {
            self.inner
                .seek(SeekFrom::Start(self.data_start + entry.compressed_size as u64))?;
        }
        self.state = EntryState::Idle;
        Ok(())
    }

    /// The entry currently under the cursor, if one is open.
    pub fn current_entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Compares the running CRC against the header's, once per entry.
    fn check_crc(&mut self, actual: u32) -> io::Result<()> {
        if self.crc_checked {
            return Ok(());
        }
        self.crc_checked = true;
        let expected = self
            .current
            .as_ref()
            .map(|entry| entry.crc32)
            .unwrap_or_default();
        if actual != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid checksum",
            ));
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for ZipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.state {
            EntryState::Idle | EntryState::Skipped => Ok(0),
            EntryState::Stored { remain } => {
                if remain == 0 {
                    let crc = self.hasher.clone().finalize();
                    self.check_crc(crc)?;
                    return Ok(0);
                }
                let wanted = (remain as usize).min(buf.len());
                let got = self.inner.read(&mut buf[..wanted])?;
                if got == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stored entry payload cut short",
                    ));
                }
                self.hasher.update(&buf[..got]);
                self.state = EntryState::Stored {
                    remain: remain - got as u32,
                };
                Ok(got)
            }
            EntryState::Deflated => {
                let got = self.inflater.read_some(&mut self.inner, buf)?;
                if got == 0 {
                    let crc = self.inflater.crc32();
                    self.check_crc(crc)?;
                }
                Ok(got)
            }
        }
    }
}
