use std::fs;
use std::io::{Cursor, Read, Write};

use anyhow::Result;
use camino::Utf8PathBuf;

use zipio::{
    CompressionMethod, DirCollection, FileCollection, MatchMode, ZipCollection, ZipEntry,
    ZipError, ZipWriter,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Lays out a small source tree:
///
/// ```text
/// hello/hi.txt
/// hello/nested/deep.txt
/// top.txt
/// ```
fn scratch_tree() -> Result<(tempfile::TempDir, Utf8PathBuf)> {
    let dir = tempfile::tempdir()?;
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp paths are UTF-8");
    fs::create_dir_all(root.join("hello/nested"))?;
    fs::write(root.join("hello/hi.txt"), b"hi there")?;
    fs::write(root.join("hello/nested/deep.txt"), b"way down")?;
    fs::write(root.join("top.txt"), b"surface level")?;
    Ok((dir, root))
}

#[test]
fn directory_collections_index_files_recursively() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;
    let collection = DirCollection::open(&root)?;

    assert_eq!(collection.len()?, 3);
    let names: Vec<_> = collection
        .entries()?
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, ["hello/hi.txt", "hello/nested/deep.txt", "top.txt"]);

    let entry = collection.get_entry("top.txt", MatchMode::Ignore)?.unwrap();
    assert_eq!(entry.size, "surface level".len() as u32);
    assert_eq!(entry.method, CompressionMethod::Stored);
    Ok(())
}

#[test]
fn directory_streams_read_file_contents() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;
    let collection = DirCollection::open(&root)?;

    let mut contents = String::new();
    collection
        .input_stream("hello/hi.txt", MatchMode::Ignore)?
        .read_to_string(&mut contents)?;
    assert_eq!(contents, "hi there");

    // Tail matching works the same as in archives.
    let mut contents = String::new();
    collection
        .input_stream("deep.txt", MatchMode::Match)?
        .read_to_string(&mut contents)?;
    assert_eq!(contents, "way down");
    Ok(())
}

#[test]
fn missing_entries_are_collection_errors() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;
    let collection = DirCollection::open(&root)?;

    assert!(collection.get_entry("absent", MatchMode::Match)?.is_none());
    match collection.input_stream("absent", MatchMode::Match) {
        Err(ZipError::NoSuchEntry(name)) => assert_eq!(name, "absent"),
        Err(other) => panic!("Expected NoSuchEntry, got {other:?}"),
        Ok(_) => panic!("Got a stream back for a missing entry"),
    }
    Ok(())
}

#[test]
fn closed_collections_refuse_everything() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;
    let mut collection = DirCollection::open(&root)?;
    collection.close();

    assert!(matches!(collection.entries(), Err(ZipError::CollectionClosed)));
    assert!(matches!(collection.len(), Err(ZipError::CollectionClosed)));
    assert!(matches!(
        collection.get_entry("top.txt", MatchMode::Ignore),
        Err(ZipError::CollectionClosed)
    ));
    assert!(matches!(
        collection.input_stream("top.txt", MatchMode::Ignore),
        Err(ZipError::CollectionClosed)
    ));
    // Closing again is fine.
    collection.close();
    Ok(())
}

#[test]
fn opening_a_file_as_a_directory_collection_fails() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;
    assert!(matches!(
        DirCollection::open(root.join("top.txt")),
        Err(ZipError::InvalidState(_))
    ));
    Ok(())
}

/// The point of the facade: archive-backed and directory-backed
/// collections are interchangeable behind `dyn FileCollection`.
#[test]
fn zip_and_directory_collections_share_the_facade() -> Result<()> {
    init_logging();
    let (_guard, root) = scratch_tree()?;

    // Zip up the tree through its directory collection...
    let source = DirCollection::open(&root)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in source.entries()? {
        writer.put_entry(ZipEntry::new(entry.name.clone()))?;
        let mut contents = Vec::new();
        source
            .input_stream(&entry.name, MatchMode::Ignore)?
            .read_to_end(&mut contents)?;
        writer.write_all(&contents)?;
    }
    writer.finish()?;
    let archive_path = root.join("tree.zip");
    fs::write(&archive_path, writer.get_ref().get_ref())?;

    // ...then read the same file through both backends.
    let zipped = ZipCollection::open(&archive_path)?;
    let collections: Vec<Box<dyn FileCollection>> = vec![Box::new(source), Box::new(zipped)];
    for collection in &collections {
        let mut contents = String::new();
        collection
            .input_stream("hi.txt", MatchMode::Match)?
            .read_to_string(&mut contents)?;
        assert_eq!(contents, "hi there");
    }
    Ok(())
}

#[test]
fn archive_entry_timestamps_survive_the_round_trip() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entry = ZipEntry::new("dated.txt");
    entry.set_unix_time(1_600_000_000);
    let expected = entry.last_modified;
    writer.put_entry(entry)?;
    writer.write_all(b"dated contents")?;
    writer.finish()?;

    let path = Utf8PathBuf::from_path_buf(dir.path().join("dated.zip")).expect("UTF-8 temp path");
    fs::write(&path, writer.get_ref().get_ref())?;
    let collection = ZipCollection::open(&path)?;
    let entry = collection.get_entry("dated.txt", MatchMode::Ignore)?.unwrap();
    assert_eq!(entry.last_modified, expected);
    Ok(())
}

#[test]
fn entry_comments_come_back_from_the_central_directory() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entry = ZipEntry::new("annotated.txt");
    entry.comment = String::from("reviewed 2024-05");
    writer.put_entry(entry)?;
    writer.write_all(b"body")?;
    writer.finish()?;

    let path =
        Utf8PathBuf::from_path_buf(dir.path().join("annotated.zip")).expect("UTF-8 temp path");
    fs::write(&path, writer.get_ref().get_ref())?;
    let collection = ZipCollection::open(&path)?;
    let entry = collection
        .get_entry("annotated.txt", MatchMode::Ignore)?
        .unwrap();
    assert_eq!(entry.comment, "reviewed 2024-05");
    Ok(())
}
