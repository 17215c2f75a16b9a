//! Zip archive construction.
//!
//! These functions block on file I/O; async callers go through
//! [`run_blocking`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use folio_common::{Error, Result};

fn zip_error(e: ZipError) -> Error {
    match e {
        ZipError::Io(e) => Error::Io(e).classify(),
        other => Error::Archive(other.to_string()),
    }
}

fn io_error(e: io::Error) -> Error {
    Error::Io(e).classify()
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Run blocking archive work off the async runtime.
pub async fn run_blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Archive(format!("archive task failed: {}", e)))?
}

/// Copy `source` into the open archive as entry `name`.
fn add_entry(zip: &mut ZipWriter<File>, source: &Path, name: &str) -> Result<()> {
    let mut input = File::open(source).map_err(io_error)?;
    zip.start_file(name, deflated()).map_err(zip_error)?;
    io::copy(&mut input, zip).map_err(io_error)?;
    Ok(())
}

/// Zip `files` into `archive` and delete them.
///
/// Entries are named by file name. Existing archives are replaced.
pub fn zip_book_files(files: &[PathBuf], archive: &Path) -> Result<()> {
    let output = File::create(archive).map_err(io_error)?;
    let mut zip = ZipWriter::new(output);

    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("Bad file name: {}", file.display())))?;
        add_entry(&mut zip, file, name)?;
    }
    zip.finish().map_err(zip_error)?;

    for file in files {
        fs::remove_file(file).map_err(io_error)?;
    }
    debug!("Zipped {} files into {}", files.len(), archive.display());
    Ok(())
}

/// Remove `target` whether it is a file or a directory, then recreate it as
/// an empty directory.
fn recreate_dir(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target).map_err(io_error)?,
        Ok(_) => fs::remove_file(target).map_err(io_error)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(e)),
    }
    match fs::create_dir_all(target) {
        Ok(()) => Ok(()),
        // Another builder got there first.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(io_error(e)),
    }
}

/// Pack the archives named in `ordered` into numbered parts under `target_dir`.
///
/// Parts are filled greedily in order: a part is closed as soon as the bytes
/// written to it exceed `cap`, so a part ends with the entry that crossed the
/// cap. Names missing from `source_dir` are skipped with a warning.
/// Returns the part file names (`1.zip`, `2.zip`, ...).
///
/// # Errors
/// - [`Error::Io`] / [`Error::DiskFull`] if the target cannot be written
/// - [`Error::Archive`] if the zip writer fails
pub fn build_split_archive(
    ordered: &[String],
    source_dir: &Path,
    target_dir: &Path,
    cap: u64,
) -> Result<Vec<String>> {
    recreate_dir(target_dir)?;

    let mut parts = Vec::new();
    let mut current: Option<(ZipWriter<File>, PathBuf)> = None;

    for name in ordered {
        if current.is_none() {
            let part_name = format!("{}.zip", parts.len() + 1);
            let part_path = target_dir.join(&part_name);
            let file = File::create(&part_path).map_err(io_error)?;
            current = Some((ZipWriter::new(file), part_path));
            parts.push(part_name);
        }
        let Some((zip, part_path)) = current.as_mut() else {
            continue;
        };

        let source = source_dir.join(name);
        if !source.is_file() {
            warn!("No archive for {}; bundle will be missing this text", name);
            continue;
        }
        add_entry(zip, &source, name)?;
        zip.flush().map_err(io_error)?;

        let written = fs::metadata(&*part_path).map_err(io_error)?.len();
        if written > cap {
            if let Some((zip, _)) = current.take() {
                zip.finish().map_err(zip_error)?;
            }
        }
    }

    if let Some((zip, _)) = current.take() {
        zip.finish().map_err(zip_error)?;
    }

    debug!("Built {} parts in {}", parts.len(), target_dir.display());
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_source(dir: &Path, name: &str, size: usize) {
        // Pseudo-random bytes so deflate cannot shrink them much.
        let mut state: u32 = 0x1234_5678 ^ size as u32;
        let data: Vec<u8> = (0..size)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        fs::write(dir.join(name), data).unwrap();
    }

    fn entries(part: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(part).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_part_under_cap() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_source(src.path(), "Job.zip", 1000);
        write_source(src.path(), "Genesis.zip", 1000);

        let target = out.path().join("bundle");
        let parts = build_split_archive(
            &names(&["Job.zip", "Genesis.zip"]),
            src.path(),
            &target,
            100_000_000,
        )
        .unwrap();

        assert_eq!(parts, vec!["1.zip"]);
        assert_eq!(entries(&target.join("1.zip")), vec!["Job.zip", "Genesis.zip"]);
    }

    #[test]
    fn test_parts_close_after_crossing_cap() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a.zip", "b.zip", "c.zip"] {
            write_source(src.path(), name, 4000);
        }

        let target = out.path().join("bundle");
        let parts =
            build_split_archive(&names(&["a.zip", "b.zip", "c.zip"]), src.path(), &target, 5000)
                .unwrap();

        assert_eq!(parts, vec!["1.zip", "2.zip"]);
        assert_eq!(entries(&target.join("1.zip")), vec!["a.zip", "b.zip"]);
        assert_eq!(entries(&target.join("2.zip")), vec!["c.zip"]);
    }

    #[test]
    fn test_missing_sources_skipped() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_source(src.path(), "b.zip", 10);

        let target = out.path().join("bundle");
        let parts =
            build_split_archive(&names(&["a.zip", "b.zip"]), src.path(), &target, 1_000).unwrap();

        assert_eq!(parts, vec!["1.zip"]);
        assert_eq!(entries(&target.join("1.zip")), vec!["b.zip"]);
    }

    #[test]
    fn test_target_file_is_replaced() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_source(src.path(), "a.zip", 10);
        let target = out.path().join("bundle");
        fs::write(&target, b"stale").unwrap();

        let parts = build_split_archive(&names(&["a.zip"]), src.path(), &target, 1_000).unwrap();
        assert_eq!(parts, vec!["1.zip"]);
        assert!(target.is_dir());
    }

    #[test]
    fn test_zip_book_files_removes_sources() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["Ruth 1.metadata.json", "Ruth_index.json"]
            .iter()
            .map(|n| {
                let path = dir.path().join(n);
                fs::write(&path, b"{}").unwrap();
                path
            })
            .collect();
        let archive = dir.path().join("Ruth.zip");

        zip_book_files(&files, &archive).unwrap();

        assert!(files.iter().all(|f| !f.exists()));
        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("Ruth_index.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let value = run_blocking(|| Ok(7)).await.unwrap();
        assert_eq!(value, 7);
    }
}
