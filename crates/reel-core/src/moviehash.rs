//! OpenSubtitles moviehash.
//!
//! The hash is the file size plus the first and last 64 KiB folded as
//! wrapping little-endian u64 sums, rendered as 16 hex digits. Files under
//! 128 KiB have no defined hash.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::ReelError;

const CHUNK_SIZE: u64 = 65536;

/// Compute the moviehash for a file; `None` for files too small to hash.
pub fn moviehash(path: &Path) -> Result<Option<String>, ReelError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size < CHUNK_SIZE * 2 {
        return Ok(None);
    }

    let mut hash = size;
    hash = hash.wrapping_add(sum_chunk(&mut file)?);

    file.seek(SeekFrom::Start(size - CHUNK_SIZE))?;
    hash = hash.wrapping_add(sum_chunk(&mut file)?);

    Ok(Some(format!("{hash:016x}")))
}

fn sum_chunk(file: &mut File) -> Result<u64, ReelError> {
    let mut buf = vec![0u8; CHUNK_SIZE as usize];
    file.read_exact(&mut buf)?;
    let mut sum: u64 = 0;
    for word in buf.chunks_exact(8) {
        let value = u64::from_le_bytes(word.try_into().expect("chunk is 8 bytes"));
        sum = sum.wrapping_add(value);
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_small_file_has_no_hash() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 1024]).unwrap();
        assert!(moviehash(file.path()).unwrap().is_none());
    }

    #[test]
    fn test_zero_file_hash_is_size() {
        // All-zero chunks contribute nothing; the hash is just the size.
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 131072]).unwrap();
        assert_eq!(
            moviehash(file.path()).unwrap().as_deref(),
            Some("0000000000020000")
        );
    }

    #[test]
    fn test_content_changes_hash() {
        let mut a = NamedTempFile::new().unwrap();
        a.write_all(&vec![0u8; 200000]).unwrap();
        let mut b = NamedTempFile::new().unwrap();
        let mut data = vec![0u8; 200000];
        data[0] = 1;
        b.write_all(&data).unwrap();

        assert_ne!(
            moviehash(a.path()).unwrap(),
            moviehash(b.path()).unwrap()
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = moviehash(Path::new("/no/such/file.mkv")).unwrap_err();
        assert!(matches!(err, ReelError::Io(_)));
    }
}
