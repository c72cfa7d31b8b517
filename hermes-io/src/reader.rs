//! Read-only access to raw `.tpx3` files.

use crate::{Error, Result};
use hermes_tpx::{decode_file, DecodedFile, DecoderOptions};
use memmap2::Mmap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Raw bytes of one input file, mapped rather than read.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Maps `path` read-only.
    ///
    /// # Errors
    /// [`Error::FileNotFound`] if the path does not exist, otherwise any
    /// I/O error from opening or mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        // SAFETY: the mapping is read-only and input files are not written
        // while a run is in progress.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A mapped TPX3 file plus the options to decode it with.
pub struct Tpx3FileReader {
    reader: MappedFileReader,
    options: DecoderOptions,
}

impl Tpx3FileReader {
    /// Maps `path` with default decoder options.
    ///
    /// # Errors
    /// See [`MappedFileReader::open`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            options: DecoderOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Whole 64-bit words in the file.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.reader.len() / 8
    }

    /// Decodes every well-formed chunk of the file, in file order.
    ///
    /// # Errors
    /// [`Error::CorruptFile`] (tagged with the path) if the file cannot be
    /// decoded at all, [`Error::InternalConsistency`] if packet accounting
    /// fails.
    pub fn decode(&self) -> Result<DecodedFile> {
        decode_file(self.reader.as_bytes(), self.options.clone()).map_err(|e| match e {
            hermes_tpx::Error::CorruptFile(reason) => Error::CorruptFile {
                path: self.reader.path().to_path_buf(),
                reason,
            },
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_tpx::packet::build;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(data: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_mapping_matches_file() {
        let bytes: Vec<u8> = (0..64).collect();
        let tmp = write_temp(&bytes);

        let mapped = MappedFileReader::open(tmp.path()).unwrap();
        assert_eq!(mapped.len(), 64);
        assert!(!mapped.is_empty());
        assert_eq!(mapped.as_bytes(), bytes.as_slice());
        assert_eq!(mapped.path(), tmp.path());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappedFileReader::open(dir.path().join("absent.tpx3"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let tmp = NamedTempFile::new().unwrap();
        let tpx = Tpx3FileReader::open(tmp.path()).unwrap();
        assert_eq!(tpx.word_count(), 0);
        let err = tpx.decode().err().unwrap();
        assert!(matches!(err, Error::CorruptFile { .. }));
    }

    #[test]
    fn test_partial_word_is_corrupt() {
        let tmp = write_temp(&[0u8; 7]);
        let err = Tpx3FileReader::open(tmp.path())
            .unwrap()
            .decode()
            .err()
            .unwrap();
        match err {
            Error::CorruptFile { path, .. } => assert_eq!(path, tmp.path()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_max_packets() {
        let words = build::chunk(0, &[build::pixel(1, 1, 10, 0, 5, 0); 4]);
        let tmp = write_temp(&build::to_bytes(&words));
        let tpx = Tpx3FileReader::open(tmp.path())
            .unwrap()
            .with_options(DecoderOptions::default().with_max_packets(3));
        assert_eq!(tpx.word_count(), 5);

        let decoded = tpx.decode().unwrap();
        assert_eq!(decoded.diagnostics.total_packets, 3);
        assert_eq!(decoded.signals.len(), 2);
    }
}
