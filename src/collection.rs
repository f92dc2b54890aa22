//! Collections: a uniform facade over sets of named, readable entries.
//!
//! [`ZipCollection`] serves entries out of a ZIP archive's central
//! directory; [`DirCollection`] serves the files under a filesystem
//! directory through the same interface. Code written against
//! [`FileCollection`] doesn't care which one it got.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::time::UNIX_EPOCH;

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::entry::{CompressionMethod, ZipEntry};
use crate::index::{Index, MatchMode};
use crate::read::ZipReader;
use crate::result::*;
use crate::spec;

/// A set of named entries that can be enumerated, looked up, and
/// opened for reading.
///
/// Every method except [`close`](Self::close) fails with
/// [`ZipError::CollectionClosed`] once the collection is closed.
pub trait FileCollection {
    /// The entries, in their collection order.
    fn entries(&self) -> ZipResult<&[ZipEntry]>;

    /// Looks up an entry by name. `MatchMode::Match` also accepts the
    /// query as a path tail: `x.h` finds `src/lib/x.h`.
    fn get_entry(&self, name: &str, mode: MatchMode) -> ZipResult<Option<&ZipEntry>>;

    /// Opens the named entry's decompressed payload for reading.
    fn input_stream(&self, name: &str, mode: MatchMode) -> ZipResult<Box<dyn Read + Send>>;

    /// Number of entries in the collection.
    fn len(&self) -> ZipResult<usize>;

    fn is_empty(&self) -> ZipResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Invalidates the collection. Idempotent.
    fn close(&mut self);
}

/// A collection backed by a ZIP archive on disk.
///
/// Opening parses the entire central directory up front; entry streams
/// are served from fresh file handles, so any number can be open at
/// once and the collection itself stays immutable.
pub struct ZipCollection {
    path: Utf8PathBuf,
    index: Index,
    /// Bytes prepended before the archive proper (a self-extracting
    /// stub, say). Central directory offsets are relative to the
    /// archive start, so every seek adds this.
    archive_offset: u64,
    comment: Vec<u8>,
    open: bool,
}

impl ZipCollection {
    /// Opens an archive and reads its central directory.
    pub fn open(path: impl AsRef<Utf8Path>) -> ZipResult<Self> {
        let path = path.as_ref().to_owned();
        let mut file = File::open(&path)?;

        let (eocdr_posit, eocdr) = spec::find_eocdr(&mut file)?;
        trace!("{eocdr:?}");
        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        // The archive may be prepended by arbitrary junk, making every
        // stored offset short by the same amount. The directory
        // actually ends where the EOCDR begins; the difference from
        // the nominal offset is the prepended length.
        let directory_start = eocdr_posit
            .checked_sub(eocdr.central_directory_size as u64)
            .ok_or(ZipError::InvalidArchive(
                "Invalid central directory size or offset",
            ))?;
        let archive_offset = directory_start
            .checked_sub(eocdr.central_directory_offset as u64)
            .ok_or(ZipError::InvalidArchive(
                "Invalid central directory size or offset",
            ))?;
        if archive_offset != 0 {
            debug!("Archive prepended with {archive_offset} unknown bytes");
        }

        let mut directory = vec![0; eocdr.central_directory_size as usize];
        file.seek(SeekFrom::Start(directory_start))?;
        file.read_exact(&mut directory)?;

        let mut remaining = &directory[..];
        let mut index = Index::with_capacity(eocdr.entries as usize);
        for _ in 0..eocdr.entries {
            let entry = spec::read_central_entry(&mut remaining)?;
            trace!("{entry:?}");
            if entry.disk_number != 0 {
                return Err(ZipError::UnsupportedArchive(format!(
                    "No support for multi-disk archives: entry {} claims to be on disk {}",
                    entry.name, entry.disk_number
                )));
            }
            index.push(entry);
        }
        debug!("Read {} central directory entries from {path}", index.len());

        Ok(Self {
            path,
            index,
            archive_offset,
            comment: eocdr.comment,
            open: true,
        })
    }

    /// The archive comment from the end-of-central-directory record
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    fn ensure_open(&self) -> ZipResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ZipError::CollectionClosed)
        }
    }
}

impl FileCollection for ZipCollection {
    fn entries(&self) -> ZipResult<&[ZipEntry]> {
        self.ensure_open()?;
        Ok(self.index.entries())
    }

    fn get_entry(&self, name: &str, mode: MatchMode) -> ZipResult<Option<&ZipEntry>> {
        self.ensure_open()?;
        Ok(self.index.get(name, mode))
    }

    fn input_stream(&self, name: &str, mode: MatchMode) -> ZipResult<Box<dyn Read + Send>> {
        self.ensure_open()?;
        let entry = self
            .index
            .get(name, mode)
            .ok_or_else(|| ZipError::NoSuchEntry(name.to_owned()))?;
        if !entry.is_supported() {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't decode entry {}: unsupported storage format",
                entry.name
            )));
        }

        let file = File::open(&self.path)?;
        let mut reader =
            ZipReader::with_position(file, self.archive_offset + entry.header_offset)?;
        let local = reader
            .next_entry()?
            .ok_or(ZipError::InvalidArchive("Missing local file header"))?;
        if local.name != entry.name {
            return Err(ZipError::InvalidArchive(
                "Central directory entry doesn't match local file header",
            ));
        }
        Ok(Box::new(reader))
    }

    fn len(&self) -> ZipResult<usize> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// A collection backed by a directory tree on the filesystem.
///
/// Every regular file under the root becomes a Stored entry named by
/// its `/`-separated path relative to the root. The tree is walked
/// once at construction.
pub struct DirCollection {
    root: Utf8PathBuf,
    index: Index,
    open: bool,
}

impl DirCollection {
    /// Walks the directory tree under `root` and indexes its files.
    pub fn open(root: impl AsRef<Utf8Path>) -> ZipResult<Self> {
        let root = root.as_ref().to_owned();
        if !root.is_dir() {
            return Err(ZipError::InvalidState("collection root is not a directory"));
        }
        let mut index = Index::new();
        load_dir(&root, Utf8Path::new(""), &mut index)?;
        debug!("Indexed {} files under {root}", index.len());
        Ok(Self {
            root,
            index,
            open: true,
        })
    }

    fn ensure_open(&self) -> ZipResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ZipError::CollectionClosed)
        }
    }
}

/// Recursively indexes `root/subdir`, naming entries relative to the
/// root. Children are visited in name order so enumeration is stable
/// across platforms.
fn load_dir(root: &Utf8Path, subdir: &Utf8Path, index: &mut Index) -> ZipResult<()> {
    let mut children: Vec<_> = fs::read_dir(root.join(subdir))?.collect::<Result<_, _>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let name = match child.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                warn!("Skipping file with a non-UTF-8 name: {name:?}");
                continue;
            }
        };
        let relative = if subdir.as_str().is_empty() {
            Utf8PathBuf::from(&name)
        } else {
            subdir.join(&name)
        };
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            load_dir(root, &relative, index)?;
        } else if file_type.is_file() {
            let metadata = child.metadata()?;
            if metadata.len() > u32::MAX as u64 {
                warn!("Skipping {relative}: too large to represent as an archive entry");
                continue;
            }
            let mut entry = ZipEntry::new(relative.as_str().replace('\\', "/"));
            entry.method = CompressionMethod::Stored;
            entry.size = metadata.len() as u32;
            entry.compressed_size = entry.size;
            if let Ok(modified) = metadata.modified() {
                if let Ok(since_epoch) = modified.duration_since(UNIX_EPOCH) {
                    entry.set_unix_time(since_epoch.as_secs() as i64);
                }
            }
            index.push(entry);
        }
    }
    Ok(())
}

impl FileCollection for DirCollection {
    fn entries(&self) -> ZipResult<&[ZipEntry]> {
        self.ensure_open()?;
        Ok(self.index.entries())
    }

    fn get_entry(&self, name: &str, mode: MatchMode) -> ZipResult<Option<&ZipEntry>> {
        self.ensure_open()?;
        Ok(self.index.get(name, mode))
    }

    fn input_stream(&self, name: &str, mode: MatchMode) -> ZipResult<Box<dyn Read + Send>> {
        self.ensure_open()?;
        let entry = self
            .index
            .get(name, mode)
            .ok_or_else(|| ZipError::NoSuchEntry(name.to_owned()))?;
        let file = File::open(self.root.join(&entry.name))?;
        Ok(Box::new(file))
    }

    fn len(&self) -> ZipResult<usize> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
