//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`], [`write`],
//! and [`collection`] modules.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`collection`]: ../collection/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::io::{self, Read, Seek, SeekFrom, Write};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use codepage_437::*;
use log::*;
use memchr::memmem;

use crate::entry::{CompressionMethod, ZipEntry};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Size of a local file header up to the variable-length file name
pub(crate) const LOCAL_HEADER_LEN: usize = 30;
/// Size of a central directory record up to the variable-length file name
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
/// Size of the End of central directory record without its comment
pub(crate) const EOCDR_LEN: usize = 22;

/// Variable-length fields (file name, extra field, comments) carry
/// 16-bit lengths, capping each at 65 535 bytes.
pub(crate) const FIELD_CAP: usize = u16::MAX as usize;

/// The EOCDR must sit within the last `EOCDR_LEN + FIELD_CAP` bytes
/// of the file: the record itself plus the largest possible comment.
const EOCDR_SEARCH_SPAN: u64 = (EOCDR_LEN + FIELD_CAP) as u64;

/// Zip format version 2.0: deflate plus directory entries,
/// everything this library emits.
pub(crate) const EXTRACT_VERSION: u16 = 0x0014;

/// Default external attributes for written entries: a regular file with
/// rw-rw-r-- permissions, matching what Info-ZIP produces on Unix.
pub(crate) const DEFAULT_EXTERNAL_ATTRIBUTES: u32 = 0x81B4_0000;

// 4.4.2.2 "version made by" host codes (values are pre-shifted).
const HOST_MSDOS: u16 = 0x0000;
const HOST_UNIX: u16 = 0x0300;
const HOST_OSX: u16 = 0x1300;

/// The "version made by" field written into central directory records:
/// format version 2.0 combined with the compile-time host code.
/// Readers treat the host byte as advisory and never interpret it.
pub(crate) fn writer_version() -> u16 {
    let host = if cfg!(windows) {
        HOST_MSDOS
    } else if cfg!(target_os = "macos") {
        HOST_OSX
    } else {
        HOST_UNIX
    };
    EXTRACT_VERSION | host
}

// Straight from the Rust docs:

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Appends a little-endian u32 to a header block under construction.
fn push_u32(block: &mut Vec<u8>, value: u32) {
    block.extend_from_slice(&value.to_le_bytes());
}

/// Appends a little-endian u16 to a header block under construction.
fn push_u16(block: &mut Vec<u8>, value: u16) {
    block.extend_from_slice(&value.to_le_bytes());
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
fn is_utf8(flags: u16) -> bool {
    // Bit 11: Language encoding flag (EFS).  If this bit is set,
    //         the filename and comment fields for this file
    //         MUST be encoded using UTF-8. (see APPENDIX D)
    flags & (1 << 11) != 0
}

/// Decodes a file name or comment per the entry's flags:
/// UTF-8 when bit 11 is set, CP437 otherwise.
pub(crate) fn decode_text(bytes: &[u8], flags: u16) -> ZipResult<String> {
    if is_utf8(flags) {
        Ok(std::str::from_utf8(bytes)
            .map_err(ZipError::Encoding)?
            .to_owned())
    } else {
        Ok(String::from_cp437(bytes.to_vec(), &CP437_CONTROL))
    }
}

/// The flags to put on the wire for an entry:
/// its own flags, plus the UTF-8 bit when the name or comment needs it.
/// (ASCII text is valid CP437, so pure-ASCII entries stay readable
/// by pre-Unicode tools.)
fn effective_flags(entry: &ZipEntry) -> u16 {
    if entry.name.is_ascii() && entry.comment.is_ascii() {
        entry.flags
    } else {
        entry.flags | 1 << 11
    }
}

// MS-DOS timestamps, used for the last-modified fields:
// seconds/2 in bits 0-4, minutes in 5-10, hours in 11-15,
// then day in 16-20, month in 21-24, and years since 1980 in 25-31.

/// The earliest time a DOS timestamp can express,
/// and the fallback for out-of-range values in either direction.
pub(crate) fn dos_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("1980-01-01 00:00:00 is a valid date")
}

/// Unpacks a DOS timestamp. Fields that don't form a real calendar date
/// (day zero, month 13, ...) collapse to the DOS epoch.
pub(crate) fn dos_to_datetime(dos: u32) -> NaiveDateTime {
    let time = dos & 0xFFFF;
    let date = dos >> 16;

    let seconds = (time & 0b0001_1111) * 2; // MSDOS uses 2-second precision
    let minutes = (time >> 5) & 0b11_1111;
    let hours = time >> 11;

    let days = date & 0b0001_1111;
    let months = (date >> 5) & 0b1111;
    // MSDOS uses years since 1980; always interpreted as a positive value
    let years = (date >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
        .unwrap_or_else(dos_epoch)
}

/// Packs a timestamp into DOS format, truncating to 2-second precision.
/// Years before 1980 or after 2107 collapse to the DOS epoch.
pub(crate) fn datetime_to_dos(t: NaiveDateTime) -> u32 {
    if t.year() < 1980 || t.year() > 2107 {
        return datetime_to_dos(dos_epoch());
    }
    let date = (((t.year() - 1980) as u32) << 9) | (t.month() << 5) | t.day();
    let time = (t.hour() << 11) | (t.minute() << 5) | (t.second() / 2);
    (date << 16) | time
}

/// Reads a four-byte record signature, or `None` at a clean EOF.
fn read_magic<R: Read>(reader: &mut R) -> ZipResult<Option<[u8; 4]>> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let got = reader.read(&mut magic[filled..])?;
        if got == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ZipError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated record signature",
            )));
        }
        filled += got;
    }
    Ok(Some(magic))
}

/// Reads an exact-length byte string (the length came from the
/// preceding header field).
fn read_field<R: Read>(reader: &mut R, len: usize) -> ZipResult<Vec<u8>> {
    let mut field = vec![0; len];
    reader.read_exact(&mut field)?;
    Ok(field)
}

/// Parses a local file header at the reader's position.
///
/// Returns `None` when the cursor has walked off the end of the local
/// entries: at EOF, or at the central directory / EOCDR signature.
/// Unknown compression methods are preserved as
/// [`CompressionMethod::Unsupported`] so a discovery pass can keep going.
pub(crate) fn read_local_entry<R: Read>(reader: &mut R) -> ZipResult<Option<ZipEntry>> {
    // 4.3.7  Local file header:
    //
    // local file header signature     4 bytes  (0x04034b50)
    // version needed to extract       2 bytes
    // general purpose bit flag        2 bytes
    // compression method              2 bytes
    // last mod file time              2 bytes
    // last mod file date              2 bytes
    // crc-32                          4 bytes
    // compressed size                 4 bytes
    // uncompressed size               4 bytes
    // file name length                2 bytes
    // extra field length              2 bytes
    //
    // file name (variable size)
    // extra field (variable size)
    let magic = match read_magic(reader)? {
        Some(m) => m,
        None => return Ok(None),
    };
    if magic == CENTRAL_DIRECTORY_MAGIC || magic == EOCDR_MAGIC {
        // Ran off the end of the local entries into the archive trailer.
        return Ok(None);
    }
    if magic != LOCAL_FILE_HEADER_MAGIC {
        return Err(ZipError::InvalidArchive("Invalid local file header"));
    }

    let mut fixed = [0u8; LOCAL_HEADER_LEN - 4];
    reader.read_exact(&mut fixed)?;
    let mut block = &fixed[..];
    let extract_version = read_u16(&mut block);
    let flags = read_u16(&mut block);
    let method = read_u16(&mut block);
    let dos_time = read_u32(&mut block);
    let crc32 = read_u32(&mut block);
    let compressed_size = read_u32(&mut block);
    let uncompressed_size = read_u32(&mut block);
    let name_length = read_u16(&mut block) as usize;
    let extra_length = read_u16(&mut block) as usize;

    let name = read_field(reader, name_length)?;
    let extra_field = read_field(reader, extra_length)?;
    if name.is_empty() {
        return Err(ZipError::InvalidArchive("Empty file name in local header"));
    }
    let name = decode_text(&name, flags)?;

    Ok(Some(ZipEntry {
        name,
        size: uncompressed_size,
        compressed_size,
        crc32,
        method: CompressionMethod::from_u16(method),
        last_modified: dos_to_datetime(dos_time),
        extra_field,
        flags,
        extract_version,
        writer_version: 0,
        comment: String::new(),
        internal_attributes: 0,
        external_attributes: 0,
        disk_number: 0,
        header_offset: 0,
    }))
}

/// Serializes a local file header (no payload bytes).
///
/// The writer calls this twice per entry: once with zeroed sizes and
/// CRC as a placeholder, then again over the same bytes once the codec
/// counters are known.
pub(crate) fn write_local_entry<W: Write>(writer: &mut W, entry: &ZipEntry) -> ZipResult<()> {
    if entry.name.is_empty() {
        return Err(ZipError::InvalidState("file name must not be empty"));
    }
    if entry.name.len() > FIELD_CAP || entry.extra_field.len() > FIELD_CAP {
        return Err(ZipError::InvalidState(
            "file name or extra field too large to save in a Zip file",
        ));
    }

    let mut block = Vec::with_capacity(entry.local_header_size());
    block.extend_from_slice(&LOCAL_FILE_HEADER_MAGIC);
    push_u16(&mut block, entry.extract_version);
    push_u16(&mut block, effective_flags(entry));
    push_u16(&mut block, entry.method.to_u16());
    push_u32(&mut block, datetime_to_dos(entry.last_modified));
    push_u32(&mut block, entry.crc32);
    push_u32(&mut block, entry.compressed_size);
    push_u32(&mut block, entry.size);
    push_u16(&mut block, entry.name.len() as u16);
    push_u16(&mut block, entry.extra_field.len() as u16);
    block.extend_from_slice(entry.name.as_bytes());
    block.extend_from_slice(&entry.extra_field);

    writer.write_all(&block)?;
    Ok(())
}

/// Parses one central directory record at the reader's position.
///
/// Unlike local headers, a bad signature here is always an error:
/// the EOCDR told us exactly how many records to expect.
pub(crate) fn read_central_entry<R: Read>(reader: &mut R) -> ZipResult<ZipEntry> {
    // 4.3.12  Central directory structure:
    //
    //   central file header signature   4 bytes  (0x02014b50)
    //   version made by                 2 bytes
    //   version needed to extract       2 bytes
    //   general purpose bit flag        2 bytes
    //   compression method              2 bytes
    //   last mod file time              2 bytes
    //   last mod file date              2 bytes
    //   crc-32                          4 bytes
    //   compressed size                 4 bytes
    //   uncompressed size               4 bytes
    //   file name length                2 bytes
    //   extra field length              2 bytes
    //   file comment length             2 bytes
    //   disk number start               2 bytes
    //   internal file attributes        2 bytes
    //   external file attributes        4 bytes
    //   relative offset of local header 4 bytes
    //
    //   file name (variable size)
    //   extra field (variable size)
    //   file comment (variable size)
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != CENTRAL_DIRECTORY_MAGIC {
        return Err(ZipError::InvalidArchive("Invalid central directory entry"));
    }

    let mut fixed = [0u8; CENTRAL_HEADER_LEN - 4];
    reader.read_exact(&mut fixed)?;
    let mut block = &fixed[..];
    let writer_version = read_u16(&mut block);
    let extract_version = read_u16(&mut block);
    let flags = read_u16(&mut block);
    let method = read_u16(&mut block);
    let dos_time = read_u32(&mut block);
    let crc32 = read_u32(&mut block);
    let compressed_size = read_u32(&mut block);
    let uncompressed_size = read_u32(&mut block);
    let name_length = read_u16(&mut block) as usize;
    let extra_length = read_u16(&mut block) as usize;
    let comment_length = read_u16(&mut block) as usize;
    let disk_number = read_u16(&mut block);
    let internal_attributes = read_u16(&mut block);
    let external_attributes = read_u32(&mut block);
    let header_offset = read_u32(&mut block);

    let name = read_field(reader, name_length)?;
    let extra_field = read_field(reader, extra_length)?;
    let comment = read_field(reader, comment_length)?;
    if name.is_empty() {
        return Err(ZipError::InvalidArchive(
            "Empty file name in central directory entry",
        ));
    }
    let name = decode_text(&name, flags)?;
    let comment = decode_text(&comment, flags)?;

    Ok(ZipEntry {
        name,
        size: uncompressed_size,
        compressed_size,
        crc32,
        method: CompressionMethod::from_u16(method),
        last_modified: dos_to_datetime(dos_time),
        extra_field,
        flags,
        extract_version,
        writer_version,
        comment,
        internal_attributes,
        external_attributes,
        disk_number,
        header_offset: header_offset as u64,
    })
}

/// Serializes one central directory record.
///
/// The "version made by" field is always this build's
/// [`writer_version()`]; whatever a parsed entry carried is advisory
/// and not echoed back.
pub(crate) fn write_central_entry<W: Write>(writer: &mut W, entry: &ZipEntry) -> ZipResult<()> {
    if entry.name.is_empty() {
        return Err(ZipError::InvalidState("file name must not be empty"));
    }
    if entry.name.len() > FIELD_CAP
        || entry.extra_field.len() > FIELD_CAP
        || entry.comment.len() > FIELD_CAP
    {
        return Err(ZipError::InvalidState(
            "file name, extra field, or comment too large to save in a Zip file",
        ));
    }
    if entry.header_offset > u32::MAX as u64 {
        return Err(ZipError::InvalidState(
            "local header offset too large to fit in a zip archive",
        ));
    }

    let mut block = Vec::with_capacity(entry.central_header_size());
    block.extend_from_slice(&CENTRAL_DIRECTORY_MAGIC);
    push_u16(&mut block, writer_version());
    push_u16(&mut block, entry.extract_version);
    push_u16(&mut block, effective_flags(entry));
    push_u16(&mut block, entry.method.to_u16());
    push_u32(&mut block, datetime_to_dos(entry.last_modified));
    push_u32(&mut block, entry.crc32);
    push_u32(&mut block, entry.compressed_size);
    push_u32(&mut block, entry.size);
    push_u16(&mut block, entry.name.len() as u16);
    push_u16(&mut block, entry.extra_field.len() as u16);
    push_u16(&mut block, entry.comment.len() as u16);
    push_u16(&mut block, entry.disk_number);
    push_u16(&mut block, entry.internal_attributes);
    push_u32(&mut block, entry.external_attributes);
    push_u32(&mut block, entry.header_offset as u32);
    block.extend_from_slice(entry.name.as_bytes());
    block.extend_from_slice(&entry.extra_field);
    block.extend_from_slice(entry.comment.as_bytes());

    writer.write_all(&block)?;
    Ok(())
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub(crate) struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub fn parse(mut eocdr: &[u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes

        // Assert the magic instead of checking for it
        // because the search should have found it.
        assert_eq!(eocdr[..4], EOCDR_MAGIC);
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr) as usize;
        if eocdr.len() < comment_length {
            return Err(ZipError::InvalidArchive(
                "Truncated End Of Central Directory Record comment",
            ));
        }
        let comment = eocdr[..comment_length].to_vec();

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            comment,
        })
    }

    /// Serializes the record. Must be written after the last central
    /// directory record, i.e. at the very end of the archive.
    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        if self.comment.len() > FIELD_CAP {
            return Err(ZipError::InvalidState(
                "archive comment too large to save in a Zip file",
            ));
        }

        let mut block = Vec::with_capacity(EOCDR_LEN + self.comment.len());
        block.extend_from_slice(&EOCDR_MAGIC);
        push_u16(&mut block, self.disk_number);
        push_u16(&mut block, self.disk_with_central_directory);
        push_u16(&mut block, self.entries_on_this_disk);
        push_u16(&mut block, self.entries);
        push_u32(&mut block, self.central_directory_size);
        push_u32(&mut block, self.central_directory_offset);
        push_u16(&mut block, self.comment.len() as u16);
        block.extend_from_slice(&self.comment);

        writer.write_all(&block)?;
        Ok(())
    }
}

/// Searches backward through the end of the source to find the
/// End of central directory record.
///
/// It should be right at the end of the file, but its variable-size
/// comment means we can't jump to a known offset. The comment (or a
/// self-extracting archive's payload) can also embed the magic bytes,
/// so every candidate is validated: the record plus its declared
/// comment must run exactly to end-of-file. First valid candidate from
/// the end wins.
///
/// Returns the record's absolute offset along with the parsed record.
pub(crate) fn find_eocdr<R: Read + Seek>(
    reader: &mut R,
) -> ZipResult<(u64, EndOfCentralDirectory)> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let tail_len = file_size.min(EOCDR_SEARCH_SPAN);
    reader.seek(SeekFrom::Start(file_size - tail_len))?;
    let mut tail = vec![0; tail_len as usize];
    reader.read_exact(&mut tail)?;

    for posit in memmem::rfind_iter(&tail, &EOCDR_MAGIC) {
        if tail.len() - posit < EOCDR_LEN {
            continue;
        }
        let comment_length = u16::from_le_bytes([tail[posit + 20], tail[posit + 21]]) as usize;
        if posit + EOCDR_LEN + comment_length != tail.len() {
            trace!("Skipping EOCDR candidate at tail offset {posit}: record does not end at EOF");
            continue;
        }
        let eocdr = EndOfCentralDirectory::parse(&tail[posit..])?;
        return Ok((file_size - tail_len + posit as u64, eocdr));
    }

    Err(ZipError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn sample_entry() -> ZipEntry {
        let mut entry = ZipEntry::new("src/lib.rs");
        entry.size = 1234;
        entry.compressed_size = 600;
        entry.crc32 = 0xDEAD_BEEF;
        entry.method = CompressionMethod::Deflate;
        entry.set_unix_time(1_600_000_000);
        entry.extra_field = vec![1, 2, 3, 4];
        entry
    }

    #[test]
    fn dos_time_round_trips_at_two_second_precision() {
        let t = NaiveDate::from_ymd_opt(2020, 9, 13)
            .unwrap()
            .and_hms_opt(12, 26, 40)
            .unwrap();
        assert_eq!(dos_to_datetime(datetime_to_dos(t)), t);

        let odd = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let truncated = odd.with_second(58).unwrap();
        assert_eq!(dos_to_datetime(datetime_to_dos(odd)), truncated);
    }

    #[test]
    fn out_of_range_times_collapse_to_the_dos_epoch() {
        let before = NaiveDate::from_ymd_opt(1969, 7, 20)
            .unwrap()
            .and_hms_opt(20, 17, 0)
            .unwrap();
        assert_eq!(dos_to_datetime(datetime_to_dos(before)), dos_epoch());

        // Day and month of zero don't exist in any calendar.
        assert_eq!(dos_to_datetime(0), dos_epoch());
    }

    #[test]
    fn local_entry_round_trips() {
        let entry = sample_entry();
        let mut block = Vec::new();
        write_local_entry(&mut block, &entry).unwrap();
        assert_eq!(block.len(), entry.local_header_size());
        assert_eq!(&block[..4], b"PK\x03\x04");

        let parsed = read_local_entry(&mut Cursor::new(&block)).unwrap().unwrap();
        assert_eq!(parsed.name, entry.name);
        assert_eq!(parsed.size, entry.size);
        assert_eq!(parsed.compressed_size, entry.compressed_size);
        assert_eq!(parsed.crc32, entry.crc32);
        assert_eq!(parsed.method, entry.method);
        assert_eq!(parsed.last_modified, entry.last_modified);
        assert_eq!(parsed.extra_field, entry.extra_field);
    }

    #[test]
    fn central_entry_round_trips() {
        let mut entry = sample_entry();
        entry.comment = String::from("first revision");
        entry.header_offset = 77;
        let mut block = Vec::new();
        write_central_entry(&mut block, &entry).unwrap();
        assert_eq!(block.len(), entry.central_header_size());
        assert_eq!(&block[..4], b"PK\x01\x02");

        let parsed = read_central_entry(&mut Cursor::new(&block)).unwrap();
        assert_eq!(parsed.name, entry.name);
        assert_eq!(parsed.comment, entry.comment);
        assert_eq!(parsed.header_offset, 77);
        assert_eq!(parsed.external_attributes, DEFAULT_EXTERNAL_ATTRIBUTES);
        assert_eq!(parsed.writer_version, writer_version());
    }

    #[test]
    fn non_ascii_names_get_the_utf8_flag() {
        let entry = ZipEntry::new("naïve.txt");
        let mut block = Vec::new();
        write_local_entry(&mut block, &entry).unwrap();
        let parsed = read_local_entry(&mut Cursor::new(&block)).unwrap().unwrap();
        assert!(is_utf8(parsed.flags));
        assert_eq!(parsed.name, "naïve.txt");
    }

    #[test]
    fn cp437_names_decode_without_the_utf8_flag() {
        // Hand-build a header whose name is "grün" in CP437 (0x81 is ü)
        // with the language encoding flag clear.
        let mut block = Vec::new();
        block.extend_from_slice(&LOCAL_FILE_HEADER_MAGIC);
        push_u16(&mut block, EXTRACT_VERSION);
        push_u16(&mut block, 0); // flags: not UTF-8
        push_u16(&mut block, 0); // stored
        push_u32(&mut block, 0); // dos time
        push_u32(&mut block, 0); // crc
        push_u32(&mut block, 0); // compressed size
        push_u32(&mut block, 0); // uncompressed size
        push_u16(&mut block, 4); // filename len
        push_u16(&mut block, 0); // extra len
        block.extend_from_slice(b"gr\x81n");

        let parsed = read_local_entry(&mut Cursor::new(&block)).unwrap().unwrap();
        assert_eq!(parsed.name, "grün");
    }

    #[test]
    fn empty_names_are_rejected_both_ways() {
        let mut entry = sample_entry();
        entry.name = String::new();
        assert!(matches!(
            write_local_entry(&mut Vec::new(), &entry),
            Err(ZipError::InvalidState(_))
        ));

        // A local header whose filename_len is zero.
        let mut block = Vec::new();
        write_local_entry(&mut block, &ZipEntry::new("x")).unwrap();
        block[26] = 0;
        block.truncate(LOCAL_HEADER_LEN);
        assert!(matches!(
            read_local_entry(&mut Cursor::new(&block)),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn oversized_fields_are_logic_errors() {
        let mut entry = sample_entry();
        entry.extra_field = vec![0; FIELD_CAP + 1];
        assert!(matches!(
            write_local_entry(&mut Vec::new(), &entry),
            Err(ZipError::InvalidState(_))
        ));

        let mut entry = sample_entry();
        entry.header_offset = u64::from(u32::MAX) + 1;
        assert!(matches!(
            write_central_entry(&mut Vec::new(), &entry),
            Err(ZipError::InvalidState(_))
        ));
    }

    #[test]
    fn filenames_longer_than_a_kilobyte_survive() {
        let long_name = "d/".repeat(600) + "leaf";
        assert!(long_name.len() > 1023 && long_name.len() <= FIELD_CAP);
        let entry = ZipEntry::new(long_name.clone());
        let mut block = Vec::new();
        write_local_entry(&mut block, &entry).unwrap();
        let parsed = read_local_entry(&mut Cursor::new(&block)).unwrap().unwrap();
        assert_eq!(parsed.name, long_name);
    }

    #[test]
    fn walking_into_the_central_directory_ends_local_entries() {
        let mut block = Vec::new();
        write_central_entry(&mut block, &sample_entry()).unwrap();
        assert!(read_local_entry(&mut Cursor::new(&block)).unwrap().is_none());
        assert!(read_local_entry(&mut Cursor::new(&[] as &[u8]))
            .unwrap()
            .is_none());
    }

    fn eocdr_bytes(entries: u16, size: u32, offset: u32, comment: &[u8]) -> Vec<u8> {
        let record = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size: size,
            central_directory_offset: offset,
            comment: comment.to_vec(),
        };
        let mut block = Vec::new();
        record.write(&mut block).unwrap();
        block
    }

    #[test]
    fn locator_finds_a_bare_eocdr() {
        // An empty archive is just the 22-byte record.
        let file = eocdr_bytes(0, 0, 0, b"");
        let (posit, eocdr) = find_eocdr(&mut Cursor::new(&file)).unwrap();
        assert_eq!(posit, 0);
        assert_eq!(eocdr.entries, 0);
    }

    #[test]
    fn locator_handles_a_maximum_length_comment() {
        let comment = vec![b'z'; FIELD_CAP];
        let file = eocdr_bytes(3, 150, 4096, &comment);
        let (posit, eocdr) = find_eocdr(&mut Cursor::new(&file)).unwrap();
        assert_eq!(posit, 0);
        assert_eq!(eocdr.comment.len(), FIELD_CAP);
    }

    #[test]
    fn locator_skips_magic_bytes_embedded_in_the_comment() {
        // A comment containing a fake EOCDR signature: the bytes where
        // the fake's comment length would sit don't reach EOF, so the
        // real record (earlier in the file) must win.
        let mut comment = b"PK\x05\x06".to_vec();
        comment.extend_from_slice(&[0xAA; 18]);
        let file = eocdr_bytes(1, 46, 30, &comment);
        let (posit, eocdr) = find_eocdr(&mut Cursor::new(&file)).unwrap();
        assert_eq!(posit, 0);
        assert_eq!(eocdr.entries, 1);
    }

    #[test]
    fn locator_ignores_junk_before_the_record() {
        let mut file = b"MZ self-extracting stub".to_vec();
        let stub_len = file.len() as u64;
        file.extend_from_slice(&eocdr_bytes(2, 92, 60, b"hello"));
        let (posit, _) = find_eocdr(&mut Cursor::new(&file)).unwrap();
        assert_eq!(posit, stub_len);
    }

    #[test]
    fn locator_fails_on_a_zeroed_signature() {
        let mut file = eocdr_bytes(1, 46, 30, b"");
        file[0..4].copy_from_slice(&[0; 4]);
        assert!(matches!(
            find_eocdr(&mut Cursor::new(&file)),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn truncated_central_directory_fails_on_the_damaged_record_only() {
        let mut directory = Vec::new();
        let mut first = sample_entry();
        first.name = String::from("intact");
        write_central_entry(&mut directory, &first).unwrap();
        let mut second = sample_entry();
        second.name = String::from("damaged");
        write_central_entry(&mut directory, &second).unwrap();
        directory.truncate(directory.len() - 10);

        let mut cursor = Cursor::new(&directory);
        let parsed = read_central_entry(&mut cursor).unwrap();
        assert_eq!(parsed.name, "intact");
        assert!(read_central_entry(&mut cursor).is_err());
    }
}
