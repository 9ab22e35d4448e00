//! Atomic file operations
//!
//! Every persisted file is replaced, never edited in place:
//!
//! 1. Write to `<name>.tmp` next to the target
//! 2. `sync_all()` the temp file
//! 3. Rename over the target (atomic on the filesystems we care about)
//!
//! A crash leaves either the old file or the new one, plus possibly a stray
//! `.tmp` that [`cleanup_temp_files`] removes on the next open.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub type AtomicResult<T> = Result<T, AtomicError>;

#[derive(Debug, Error)]
pub enum AtomicError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AtomicError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| AtomicError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `<path>.tmp`, keeping the original extension in the name
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replace `path` with `content`
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &str) -> AtomicResult<()> {
    atomic_write_with(path, |file| file.write_all(content.as_bytes()))
}

/// Atomically replace `path` with whatever `write_fn` produces
///
/// Output is buffered; large logs are streamed line by line rather than
/// built up as one string.
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> AtomicResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp = temp_path(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(AtomicError::io(parent))?;
    }

    let file = File::create(&temp).map_err(AtomicError::io(&temp))?;
    let mut writer = BufWriter::new(file);
    write_fn(&mut writer).map_err(AtomicError::io(&temp))?;
    let file = writer
        .into_inner()
        .map_err(|e| AtomicError::io(&temp)(e.into_error()))?;
    file.sync_all().map_err(AtomicError::io(&temp))?;

    fs::rename(&temp, path).map_err(AtomicError::io(path))?;
    Ok(())
}

/// Atomically replace `path` with pretty-printed JSON
pub fn atomic_write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> AtomicResult<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(value).map_err(|source| AtomicError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &content)
}

/// Rename `from` onto `to`, first moving an existing `to` to `backup`
///
/// Returns `Ok(false)` when `from` does not exist.
pub fn safe_rename<P1, P2, P3>(from: P1, to: P2, backup: Option<P3>) -> AtomicResult<bool>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>,
    P3: AsRef<Path>,
{
    let from = from.as_ref();
    let to = to.as_ref();

    if !from.exists() {
        return Ok(false);
    }

    if let Some(backup) = backup {
        let backup = backup.as_ref();
        if to.exists() {
            fs::rename(to, backup).map_err(AtomicError::io(backup))?;
        }
    }

    fs::rename(from, to).map_err(AtomicError::io(to))?;
    Ok(true)
}

/// Remove `.tmp` files left behind by an interrupted write
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> AtomicResult<usize> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(0);
    }

    let mut cleaned = 0;
    for entry in fs::read_dir(dir).map_err(AtomicError::io(dir))? {
        let path = entry.map_err(AtomicError::io(dir))?.path();
        if path.extension().is_some_and(|e| e == "tmp") {
            fs::remove_file(&path).map_err(AtomicError::io(&path))?;
            cleaned += 1;
        }
    }
    Ok(cleaned)
}
