//! The entry data model shared by local file headers,
//! central directory records, and directory collections.

use chrono::{DateTime, NaiveDateTime};

use crate::spec;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    Stored,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// One logical file in an archive.
///
/// The same type backs local file headers and central directory records;
/// the fields only the central directory carries (comment, attributes,
/// header offset) are defaulted when a local header was the source.
/// Readers hand out owned copies, so holding an entry never pins a
/// reader's cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Path of the file inside the archive, `/`-separated
    pub name: String,

    /// Uncompressed size of the file in bytes
    pub size: u32,

    /// Compressed size of the file in bytes
    pub compressed_size: u32,

    /// The CRC-32 of the decompressed file (zero until known)
    pub crc32: u32,

    /// Compression algorithm used to store the file
    pub method: CompressionMethod,

    /// The date and time the file was last modified
    pub last_modified: NaiveDateTime,

    /// Raw extra field bytes, preserved but not interpreted
    pub extra_field: Vec<u8>,

    /// General purpose bit flags
    pub flags: u16,

    /// Minimum format version needed to extract this entry
    pub extract_version: u16,

    /// Version (and host system) of the writer that produced the entry
    pub writer_version: u16,

    /// Per-entry comment, stored in the central directory only
    pub comment: String,

    /// Internal file attributes; zero for everything we write
    pub internal_attributes: u16,

    /// External file attributes (host-specific mode bits)
    pub external_attributes: u32,

    /// Disk the entry starts on; always zero in single-volume archives
    pub disk_number: u16,

    /// Absolute offset of the entry's local header (zero if unknown)
    pub header_offset: u64,
}

impl ZipEntry {
    /// Creates an entry with the given name and library defaults for
    /// everything else: stored, zero sizes, 1980-01-01 timestamp.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            compressed_size: 0,
            crc32: 0,
            method: CompressionMethod::Stored,
            last_modified: spec::dos_epoch(),
            extra_field: Vec::new(),
            flags: 0,
            extract_version: spec::EXTRACT_VERSION,
            writer_version: spec::writer_version(),
            comment: String::new(),
            internal_attributes: 0,
            external_attributes: spec::DEFAULT_EXTERNAL_ATTRIBUTES,
            disk_number: 0,
            header_offset: 0,
        }
    }

    /// The last-modified time as seconds since the Unix epoch.
    pub fn unix_time(&self) -> i64 {
        self.last_modified.and_utc().timestamp()
    }

    /// Sets the last-modified time from seconds since the Unix epoch.
    /// Values outside the representable DOS range fall back to
    /// 1980-01-01 00:00:00.
    pub fn set_unix_time(&mut self, seconds: i64) {
        self.last_modified = DateTime::from_timestamp(seconds, 0)
            .map(|t| t.naive_utc())
            .unwrap_or_else(spec::dos_epoch);
    }

    /// Size of this entry's local header on disk
    pub fn local_header_size(&self) -> usize {
        spec::LOCAL_HEADER_LEN + self.name.len() + self.extra_field.len()
    }

    /// Size of this entry's central directory record on disk
    pub fn central_header_size(&self) -> usize {
        spec::CENTRAL_HEADER_LEN + self.name.len() + self.extra_field.len() + self.comment.len()
    }

    /// True if the entry declares a trailing data descriptor
    /// (general purpose bit 3), which this library rejects.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & (1 << 3) != 0
    }

    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        // Path::ends_with() doesn't consider separators,
        // so we need a different approach.
        self.size == 0 && self.name.ends_with('/')
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// True if this library can decode the entry's payload:
    /// a supported method and no trailing data descriptor.
    pub fn is_supported(&self) -> bool {
        !matches!(self.method, CompressionMethod::Unsupported(_)) && !self.has_data_descriptor()
    }
}
