//! Tools for writing a ZIP archive.
//!
//! A [`ZipWriter`] streams entries out one at a time: each entry gets
//! a placeholder local header, its payload is compressed (or stored)
//! as it's written, and the header is back-patched with the real
//! sizes and CRC once the entry closes. [`finish`](ZipWriter::finish)
//! appends the central directory and the end-of-central-directory
//! record.

use std::io::{self, Seek, SeekFrom, Write};

use crc32fast::Hasher;
use log::*;

use crate::entry::{CompressionMethod, ZipEntry};
use crate::flate::Deflater;
use crate::result::*;
use crate::spec;

/// Writes a ZIP archive to a seekable sink.
///
/// The sink must seek because finished entries are back-patched in
/// place; the alternative (trailing data descriptors) is a format
/// feature this library doesn't produce or consume.
///
/// ```
/// use std::io::{Cursor, Write};
/// use zipio::{ZipEntry, ZipWriter};
///
/// let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
/// writer.put_entry(ZipEntry::new("hello.txt"))?;
/// writer.write_all(b"hello, world")?;
/// writer.finish()?;
/// # Ok::<(), zipio::ZipError>(())
/// ```
pub struct ZipWriter<W: Write + Seek> {
    inner: W,
    entries: Vec<ZipEntry>,
    deflater: Option<Deflater>,
    stored_hasher: Hasher,
    stored_count: u64,
    method: CompressionMethod,
    level: u32,
    comment: String,
    entry_open: bool,
    finished: bool,
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Creates a writer producing entries with the default storage:
    /// DEFLATE at level 6.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            entries: Vec::new(),
            deflater: None,
            stored_hasher: Hasher::new(),
            stored_count: 0,
            method: CompressionMethod::Deflate,
            level: 6,
            comment: String::new(),
            entry_open: false,
            finished: false,
        }
    }

    /// Sets the storage method for entries opened from now on.
    pub fn set_method(&mut self, method: CompressionMethod) {
        self.method = method;
    }

    /// Sets the compression level (1-9) for entries opened from now on.
    pub fn set_level(&mut self, level: u32) {
        self.level = level.clamp(1, 9);
    }

    /// Sets the archive comment, written with the EOCDR on `finish`.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Begins a new entry, closing any open one first.
    ///
    /// The entry's name, timestamp, extra field, and comment are taken
    /// from `entry`; its method is the writer's current method, and
    /// its sizes and CRC are computed from the payload actually
    /// written.
    pub fn put_entry(&mut self, mut entry: ZipEntry) -> ZipResult<()> {
        if self.finished {
            return Err(ZipError::InvalidState("archive is already finished"));
        }
        self.close_entry()?;

        if let CompressionMethod::Unsupported(_) = self.method {
            return Err(ZipError::InvalidState("can't write an unsupported storage method"));
        }
        entry.method = self.method;
        entry.size = 0;
        entry.compressed_size = 0;
        entry.crc32 = 0;
        entry.header_offset = self.inner.stream_position()?;
        if entry.header_offset > u32::MAX as u64 {
            return Err(ZipError::InvalidState(
                "local header offset too large to fit in a zip archive",
            ));
        }
        debug!("Writing entry {} at offset {}", entry.name, entry.header_offset);

        // Sizes and CRC are placeholders until close_entry patches them.
        spec::write_local_entry(&mut self.inner, &entry)?;

        self.deflater = match self.method {
            CompressionMethod::Deflate => Some(Deflater::new(self.level)),
            _ => None,
        };
        self.stored_hasher = Hasher::new();
        self.stored_count = 0;
        self.entries.push(entry);
        self.entry_open = true;
        Ok(())
    }

    /// Closes the open entry (if any): finishes its compressed stream
    /// and back-patches the local header with the now-known compressed
    /// size, uncompressed size, and CRC-32.
    pub fn close_entry(&mut self) -> ZipResult<()> {
        if !self.entry_open {
            return Ok(());
        }

        let (crc32, uncompressed) = match self.deflater.take() {
            Some(mut deflater) => {
                deflater.finish(&mut self.inner)?;
                (deflater.crc32(), deflater.uncompressed_size())
            }
            None => (self.stored_hasher.clone().finalize(), self.stored_count),
        };

        let position = self.inner.stream_position()?;
        let entry = self
            .entries
            .last_mut()
            .expect("an open entry is always the last one recorded");
        let payload_start = entry.header_offset + entry.local_header_size() as u64;
        entry.compressed_size = u32::try_from(position - payload_start)
            .map_err(|_| ZipError::InvalidState("entry too large to fit in a zip archive"))?;
        entry.size = u32::try_from(uncompressed)
            .map_err(|_| ZipError::InvalidState("entry too large to fit in a zip archive"))?;
        entry.crc32 = crc32;

        self.inner.seek(SeekFrom::Start(entry.header_offset))?;
        spec::write_local_entry(&mut self.inner, entry)?;
        self.inner.seek(SeekFrom::Start(position))?;

        self.entry_open = false;
        Ok(())
    }

    /// Closes any open entry, then writes the central directory and
    /// the end-of-central-directory record. The archive accepts no
    /// further writes.
    pub fn finish(&mut self) -> ZipResult<()> {
        if self.finished {
            return Ok(());
        }
        self.close_entry()?;

        let directory_start = self.inner.stream_position()?;
        let mut directory_size = 0u64;
        for entry in &self.entries {
            spec::write_central_entry(&mut self.inner, entry)?;
            directory_size += entry.central_header_size() as u64;
        }

        let entries = u16::try_from(self.entries.len())
            .map_err(|_| ZipError::InvalidState("too many entries for a zip archive"))?;
        let central_directory_size = u32::try_from(directory_size)
            .map_err(|_| ZipError::InvalidState("central directory too large for a zip archive"))?;
        let central_directory_offset = u32::try_from(directory_start)
            .map_err(|_| ZipError::InvalidState("central directory offset too large for a zip archive"))?;

        let eocdr = spec::EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size,
            central_directory_offset,
            comment: self.comment.clone().into_bytes(),
        };
        eocdr.write(&mut self.inner)?;
        self.inner.flush()?;

        debug!(
            "Finished archive: {} entries, central directory at {directory_start}",
            self.entries.len()
        );
        self.finished = true;
        Ok(())
    }

    /// The entries written so far, with the sizes and CRCs of every
    /// closed entry filled in.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Seek> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished || !self.entry_open {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no entry is open for writing",
            ));
        }
        match &mut self.deflater {
            Some(deflater) => deflater
                .write_some(&mut self.inner, buf)
                .map_err(io::Error::from),
            None => {
                let written = self.inner.write(buf)?;
                self.stored_hasher.update(&buf[..written]);
                self.stored_count += written as u64;
                Ok(written)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(deflater) = &mut self.deflater {
            deflater.sync(&mut self.inner).map_err(io::Error::from)?;
        }
        self.inner.flush()
    }
}

impl<W: Write + Seek> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                warn!("Couldn't finish archive on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stored_entry_layout_is_byte_exact() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_method(CompressionMethod::Stored);
        writer.put_entry(ZipEntry::new("a.txt")).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();

        let bytes = writer.get_ref().get_ref().clone();
        assert_eq!(&bytes[..4], &[0x50, 0x4B, 0x03, 0x04]);
        assert_eq!(&bytes[30..35], b"a.txt");
        assert_eq!(&bytes[35..40], b"hello");

        // EOCDR: one entry, central directory right after the payload.
        let eocdr_at = bytes.len() - 22;
        assert_eq!(&bytes[eocdr_at..eocdr_at + 4], &[0x50, 0x4B, 0x05, 0x06]);
        let total_entries = u16::from_le_bytes([bytes[eocdr_at + 10], bytes[eocdr_at + 11]]);
        assert_eq!(total_entries, 1);
        let directory_offset = u32::from_le_bytes(
            bytes[eocdr_at + 16..eocdr_at + 20].try_into().unwrap(),
        );
        assert_eq!(directory_offset, 30 + 5 + 5);
    }

    #[test]
    fn back_patching_fills_sizes_and_crc() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_method(CompressionMethod::Stored);
        writer.put_entry(ZipEntry::new("data.bin")).unwrap();
        writer.write_all(b"1234").unwrap();
        writer.close_entry().unwrap();

        let entry = &writer.entries()[0];
        assert_eq!(entry.size, 4);
        assert_eq!(entry.compressed_size, 4);
        assert_eq!(entry.crc32, 0x9BE3E0A3);

        // And the header on disk agrees with the record in memory.
        let bytes = writer.get_ref().get_ref();
        assert_eq!(u32::from_le_bytes(bytes[14..18].try_into().unwrap()), 0x9BE3E0A3);
        assert_eq!(u32::from_le_bytes(bytes[18..22].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(bytes[22..26].try_into().unwrap()), 4);
    }

    #[test]
    fn empty_archive_is_a_bare_eocdr() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.finish().unwrap();
        let bytes = writer.get_ref().get_ref();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], &[0x50, 0x4B, 0x05, 0x06]);
    }

    #[test]
    fn writes_after_finish_are_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.put_entry(ZipEntry::new("only")).unwrap();
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            writer.put_entry(ZipEntry::new("late")),
            Err(ZipError::InvalidState(_))
        ));
        assert!(writer.write_all(b"more").is_err());
        // The finished archive is untouched by the failed calls.
        assert_eq!(writer.entries().len(), 1);
    }

    #[test]
    fn writing_without_an_open_entry_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let err = writer.write_all(b"floating").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn archive_comment_lands_in_the_eocdr() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_comment("nightly build");
        writer.finish().unwrap();
        let bytes = writer.get_ref().get_ref();
        assert!(bytes.ends_with(b"nightly build"));
        let comment_len = u16::from_le_bytes([bytes[20], bytes[21]]);
        assert_eq!(comment_len as usize, "nightly build".len());
    }

    #[test]
    fn put_entry_closes_the_previous_entry() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_method(CompressionMethod::Stored);
        writer.put_entry(ZipEntry::new("first")).unwrap();
        writer.write_all(b"one").unwrap();
        writer.put_entry(ZipEntry::new("second")).unwrap();
        writer.write_all(b"two").unwrap();
        writer.finish().unwrap();

        let entries = writer.entries();
        assert_eq!(entries[0].size, 3);
        assert_eq!(entries[1].size, 3);
        // Headers and payloads pack with no gaps.
        assert_eq!(
            entries[1].header_offset,
            entries[0].header_offset + entries[0].local_header_size() as u64 + 3
        );
    }
}
