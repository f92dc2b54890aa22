//! zipio reads and writes ZIP archives (and their single-member gzip
//! cousins) as byte streams:
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use zipio::{ZipEntry, ZipReader, ZipWriter};
//!
//! // Writing: open entries one at a time, stream their bytes, finish.
//! let sink = std::io::Cursor::new(Vec::new());
//! let mut writer = ZipWriter::new(sink);
//! writer.put_entry(ZipEntry::new("logs/build.txt"))?;
//! writer.write_all(b"all green")?;
//! writer.finish()?;
//!
//! // Reading sequentially: walk the local headers in file order.
//! let mut source = writer.get_ref().clone();
//! source.set_position(0);
//! let mut reader = ZipReader::new(source);
//! while let Some(entry) = reader.next_entry()? {
//!     let mut contents = Vec::new();
//!     reader.read_to_end(&mut contents)?;
//!     println!("{}: {} bytes", entry.name, contents.len());
//! }
//! # Ok::<(), zipio::ZipError>(())
//! ```
//!
//! For random access by name, [`ZipCollection`] parses the archive's
//! central directory up front and opens any number of independent
//! entry streams:
//!
//! ```no_run
//! use std::io;
//! use zipio::{FileCollection, MatchMode, ZipCollection};
//!
//! let collection = ZipCollection::open("release.zip")?;
//! // Exact lookup, or match on trailing path components:
//! let mut stream = collection.input_stream("docs/README", MatchMode::Match)?;
//! io::copy(&mut stream, &mut io::stdout())?;
//! # Ok::<(), zipio::ZipError>(())
//! ```
//!
//! [`DirCollection`] provides the same facade over a plain directory
//! tree, so callers can treat "a zip of the assets" and "the assets,
//! unpacked" identically.
//!
//! Zip is an interesting archive format: unlike compressed tarballs
//! often seen in Linux land (`*.tar.gz`, `*.tar.zst`, ...), each file
//! in a Zip archive is compressed independently, with a central
//! directory telling us where to find each file. The catalog sits at
//! the *back* of the file, so writers stream entries first and patch
//! each local header once its sizes and CRC are known; that patching
//! is why [`ZipWriter`] insists on a seekable sink.
//!
//! Not supported, by design: encrypted entries, multi-disk archives,
//! ZIP64 (so no entries over 4 GiB and no archives with more than
//! 65 535 entries), and entries that defer their sizes to a trailing
//! data descriptor (those are detected and reported, not decoded).
//!
//! [`ZipCollection`]: collection/struct.ZipCollection.html
//! [`DirCollection`]: collection/struct.DirCollection.html
//! [`ZipWriter`]: write/struct.ZipWriter.html

pub mod collection;
pub mod entry;
pub mod flate;
pub mod gzip;
pub mod index;
pub mod read;
pub mod result;
pub mod write;

pub use collection::{DirCollection, FileCollection, ZipCollection};
pub use entry::{CompressionMethod, ZipEntry};
pub use flate::{DeflateWriter, InflateReader};
pub use gzip::{GzipReader, GzipWriter};
pub use index::MatchMode;
pub use read::ZipReader;
pub use result::{ZipError, ZipResult};
pub use write::ZipWriter;

mod spec;
