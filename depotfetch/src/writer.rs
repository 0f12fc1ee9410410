//! Output file reconstruction.
//!
//! One [`FileWriter`] owns the handle of one output file. Writes carry an
//! explicit offset and go through positioned I/O, so workers writing disjoint
//! ranges of the same file share the writer by reference without a lock.
//!
//! The writer also answers the resume question: does the range a chunk
//! occupies already hold that chunk's bytes?

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::{ChunkId, FileEntry};

/// Errors for a single output file.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write {len} bytes at offset {offset} of {}: {source}", path.display())]
    Write {
        path: PathBuf,
        offset: u64,
        len: usize,
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("range {offset}+{len} is outside {} ({size} bytes)", path.display())]
    OutOfBounds {
        path: PathBuf,
        offset: u64,
        len: usize,
        size: u64,
    },

    #[error("{} was opened read-only", path.display())]
    ReadOnly { path: PathBuf },
}

/// Handle on one output file.
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    file: File,
    size: u64,
    /// Length of the file before this job touched it, capped at `size`.
    existing_len: u64,
    writable: bool,
}

impl FileWriter {
    /// Open (or create) the output file for `entry` under `root` and size it
    /// to the declared length.
    ///
    /// Parent directories are created. Existing content is kept so it can be
    /// verified for resume; a longer file is cut to the declared size.
    pub fn open(root: &Path, entry: &FileEntry) -> Result<Self, WriteError> {
        let path = root.join(&entry.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let previous_len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let open_err = |e| WriteError::Open {
            path: path.clone(),
            source: e,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(open_err)?;
        file.set_len(entry.size).map_err(open_err)?;

        Ok(Self {
            existing_len: previous_len.min(entry.size),
            path,
            file,
            size: entry.size,
            writable: true,
        })
    }

    /// Open an existing output file read-only, for verification.
    ///
    /// Returns `None` if the file does not exist.
    pub fn inspect(root: &Path, entry: &FileEntry) -> Result<Option<Self>, WriteError> {
        let path = root.join(&entry.path);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WriteError::Open { path, source: e }),
        };
        let len = file
            .metadata()
            .map_err(|e| WriteError::Read {
                path: path.clone(),
                source: e,
            })?
            .len();

        Ok(Some(Self {
            path,
            file,
            size: entry.size,
            existing_len: len.min(entry.size),
            writable: false,
        }))
    }

    /// Create the directory for a directory entry.
    pub fn create_directory(root: &Path, entry: &FileEntry) -> Result<PathBuf, WriteError> {
        let path = root.join(&entry.path);
        fs::create_dir_all(&path).map_err(|e| WriteError::CreateDir {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes that were on disk before the job started.
    pub fn existing_len(&self) -> u64 {
        self.existing_len
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<(), WriteError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(WriteError::OutOfBounds {
                path: self.path.clone(),
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Write `data` at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), WriteError> {
        if !self.writable {
            return Err(WriteError::ReadOnly {
                path: self.path.clone(),
            });
        }
        self.check_range(offset, data.len())?;
        write_at(&self.file, data, offset).map_err(|e| WriteError::Write {
            path: self.path.clone(),
            offset,
            len: data.len(),
            source: e,
        })
    }

    /// Read `len` bytes at `offset`.
    pub fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, WriteError> {
        self.check_range(offset, len)?;
        let mut buf = vec![0u8; len];
        read_at(&self.file, &mut buf, offset).map_err(|e| WriteError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(buf)
    }

    /// Whether the on-disk range already holds the chunk `expected`.
    ///
    /// Ranges past the pre-existing length never verify, since the job
    /// itself zero-filled them.
    pub fn verify_existing(&self, offset: u64, len: usize, expected: &ChunkId) -> bool {
        if offset.saturating_add(len as u64) > self.existing_len {
            return false;
        }
        match self.read_range(offset, len) {
            Ok(data) => ChunkId::of(&data) == *expected,
            Err(e) => {
                tracing::debug!(error = %e, "resume check failed");
                false
            }
        }
    }

    /// Flush file content to disk.
    pub fn sync(&self) -> Result<(), WriteError> {
        if !self.writable {
            return Ok(());
        }
        self.file.sync_all().map_err(|e| WriteError::Write {
            path: self.path.clone(),
            offset: 0,
            len: 0,
            source: e,
        })
    }
}

#[cfg(unix)]
fn write_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        buf = &mut std::mem::take(&mut buf)[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry::new(path, size, vec![])
    }

    #[test]
    fn test_open_creates_parents_and_preallocates() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::open(dir.path(), &entry("a/b/c.bin", 64)).unwrap();

        assert_eq!(writer.size(), 64);
        assert_eq!(writer.existing_len(), 0);
        assert_eq!(fs::metadata(dir.path().join("a/b/c.bin")).unwrap().len(), 64);
    }

    #[test]
    fn test_positioned_writes_out_of_order() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::open(dir.path(), &entry("f", 10)).unwrap();

        writer.write(5, b"world").unwrap();
        writer.write(0, b"hello").unwrap();
        writer.sync().unwrap();

        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"helloworld");
        assert_eq!(writer.read_range(2, 3).unwrap(), b"llo");
    }

    #[test]
    fn test_concurrent_disjoint_writes() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::open(dir.path(), &entry("f", 4096)).unwrap();

        std::thread::scope(|s| {
            for i in 0..16u8 {
                let writer = &writer;
                s.spawn(move || writer.write(u64::from(i) * 256, &[i; 256]).unwrap());
            }
        });

        let content = fs::read(dir.path().join("f")).unwrap();
        for i in 0..16usize {
            assert!(content[i * 256..(i + 1) * 256].iter().all(|b| *b == i as u8));
        }
    }

    #[test]
    fn test_write_out_of_bounds() {
        let dir = TempDir::new().unwrap();
        let writer = FileWriter::open(dir.path(), &entry("f", 4)).unwrap();
        assert!(matches!(
            writer.write(2, b"abc"),
            Err(WriteError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_verify_existing_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f"), b"hello world").unwrap();

        let writer = FileWriter::open(dir.path(), &entry("f", 16)).unwrap();
        assert_eq!(writer.existing_len(), 11);
        assert!(writer.verify_existing(0, 11, &ChunkId::of(b"hello world")));
        assert!(writer.verify_existing(6, 5, &ChunkId::of(b"world")));
        assert!(!writer.verify_existing(0, 5, &ChunkId::of(b"world")));
        // Zero-filled tail never verifies, even for a zero chunk
        assert!(!writer.verify_existing(11, 5, &ChunkId::of(&[0u8; 5])));
    }

    #[test]
    fn test_open_truncates_longer_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f"), b"0123456789").unwrap();

        let writer = FileWriter::open(dir.path(), &entry("f", 4)).unwrap();
        assert_eq!(writer.existing_len(), 4);
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"0123");
    }

    #[test]
    fn test_inspect_is_read_only() {
        let dir = TempDir::new().unwrap();
        assert!(FileWriter::inspect(dir.path(), &entry("missing", 4))
            .unwrap()
            .is_none());

        fs::write(dir.path().join("f"), b"abcd").unwrap();
        let reader = FileWriter::inspect(dir.path(), &entry("f", 4)).unwrap().unwrap();
        assert!(reader.verify_existing(0, 4, &ChunkId::of(b"abcd")));
        assert!(matches!(
            reader.write(0, b"x"),
            Err(WriteError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_create_directory() {
        let dir = TempDir::new().unwrap();
        let path = FileWriter::create_directory(dir.path(), &FileEntry::directory("x/y")).unwrap();
        assert!(path.is_dir());
    }
}
