use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use resup_protocol::SourceRef;
use tracing::debug;

use crate::TransferError;

/// A source opened for reading, together with its total length.
pub struct OpenedSource {
    pub reader: Box<dyn SourceReader>,
    pub total_bytes: u64,
}

/// Resolves a [`SourceRef`] into a readable handle.
pub trait SourceOpener: Send + Sync {
    /// Opens `source` and determines its size.
    ///
    /// Fails with [`TransferError::SourceUnavailable`] when the reference
    /// cannot be opened and [`TransferError::SizeUnknown`] when no length
    /// can be obtained.
    fn open(&self, source: &SourceRef) -> Result<OpenedSource, TransferError>;
}

/// Sequential reader over an opened source.
///
/// Dropping the reader releases the underlying resource.
pub trait SourceReader: Send {
    /// Advances past exactly `n` bytes without returning them.
    ///
    /// Fails with [`TransferError::ShortSkip`] if the source ends first.
    fn skip(&mut self, n: u64) -> Result<(), TransferError>;

    /// Reads up to `max_len` bytes. Returns `None` only when no bytes remain.
    fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, TransferError>;
}

// ---------------------------------------------------------------------------
// Local files
// ---------------------------------------------------------------------------

/// Opens `file://` locators and bare paths from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSourceOpener;

impl SourceOpener for FileSourceOpener {
    fn open(&self, source: &SourceRef) -> Result<OpenedSource, TransferError> {
        let path = source.to_path();
        let file = FileSource::open(&path)?;
        let total_bytes = file.len();
        Ok(OpenedSource {
            reader: Box::new(file),
            total_bytes,
        })
    }
}

/// Reads a local file.
pub struct FileSource {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Opens `path` and determines its length, first from metadata and then
    /// by seeking to the end of the descriptor.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let mut file = File::open(path).map_err(|e| {
            TransferError::SourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        // Directories open fine on Unix but fail on the first read.
        if file.metadata().is_ok_and(|m| m.is_dir()) {
            return Err(TransferError::SourceUnavailable(format!(
                "{}: is a directory",
                path.display()
            )));
        }
        let len = file_length(&mut file)
            .ok_or_else(|| TransferError::SizeUnknown(path.display().to_string()))?;
        debug!(path = %path.display(), len, "opened file source");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// Total file size in bytes, as determined on open.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceReader for FileSource {
    fn skip(&mut self, n: u64) -> Result<(), TransferError> {
        // Read through instead of seeking so a shrunk file is detected.
        let skipped = io::copy(&mut (&mut self.file).take(n), &mut io::sink())
            .map_err(TransferError::SourceRead)?;
        if skipped < n {
            return Err(TransferError::ShortSkip {
                expected: n,
                skipped,
            });
        }
        Ok(())
    }

    fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, TransferError> {
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        while filled < max_len {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::SourceRead(e)),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

fn file_length(file: &mut File) -> Option<u64> {
    if let Ok(meta) = file.metadata()
        && meta.is_file()
    {
        return Some(meta.len());
    }
    // Fallback for handles whose metadata carries no size.
    seek_length(file)
}

/// Length of a seekable handle, leaving it rewound to the start.
fn seek_length<S: Seek>(handle: &mut S) -> Option<u64> {
    let len = handle.seek(SeekFrom::End(0)).ok()?;
    handle.seek(SeekFrom::Start(0)).ok()?;
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn reads_all_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let opened = FileSourceOpener.open(&SourceRef::from_path(&path)).unwrap();
        assert_eq!(opened.total_bytes, 10);
        let mut reader = opened.reader;

        assert_eq!(reader.read_chunk(4).unwrap().unwrap(), b"AABB");
        assert_eq!(reader.read_chunk(4).unwrap().unwrap(), b"CCDD");
        assert_eq!(reader.read_chunk(4).unwrap().unwrap(), b"EE");
        assert!(reader.read_chunk(4).unwrap().is_none());
    }

    #[test]
    fn skip_then_read() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut source = FileSource::open(&path).unwrap();
        source.skip(6).unwrap();
        assert_eq!(source.read_chunk(16).unwrap().unwrap(), b"6789");
        assert!(source.read_chunk(16).unwrap().is_none());
    }

    #[test]
    fn skip_past_end_is_short_skip() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123");

        let mut source = FileSource::open(&path).unwrap();
        let err = source.skip(10).unwrap_err();
        assert!(matches!(
            err,
            TransferError::ShortSkip {
                expected: 10,
                skipped: 4
            }
        ));
    }

    #[test]
    fn empty_file_has_zero_length() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let source = FileSource::open(&path).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let locator = SourceRef::from_path(&dir.path().join("nope.bin"));
        let err = FileSourceOpener.open(&locator).err().unwrap();
        assert!(matches!(err, TransferError::SourceUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = FileSourceOpener
            .open(&SourceRef::from_path(dir.path()))
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::SourceUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn seek_length_rewinds() {
        let mut cursor = io::Cursor::new(b"0123456789".to_vec());
        cursor.set_position(3);
        assert_eq!(seek_length(&mut cursor), Some(10));
        assert_eq!(cursor.position(), 0);
    }

    struct Unseekable;

    impl Seek for Unseekable {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(ErrorKind::Unsupported, "pipe"))
        }
    }

    #[test]
    fn unseekable_handle_has_no_length() {
        assert_eq!(seek_length(&mut Unseekable), None);
        // Which `FileSource::open` reports as a terminal error.
        let err = TransferError::SizeUnknown("/dev/stdin".into());
        assert!(!err.is_retryable());
    }
}
