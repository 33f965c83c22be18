//! Compressed source format.
//!
//! The payload is a dictionary-encoded string array — entry zero is the
//! source text, later entries are reserved for auxiliary sections — laid
//! out as a length-prefixed block and deflated with zlib.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressedError {
    #[error("compressed payload is truncated")]
    Truncated,

    #[error("compressed payload holds invalid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Compress a string array into the on-disk payload.
pub fn compress_strings(strings: &[String]) -> Result<Vec<u8>, CompressedError> {
    let mut raw = Vec::new();
    raw.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in strings {
        raw.extend_from_slice(&(s.len() as u32).to_le_bytes());
        raw.extend_from_slice(s.as_bytes());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Decompress the on-disk payload back into its string array.
pub fn decompress_strings(data: &[u8]) -> Result<Vec<String>, CompressedError> {
    let mut raw = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut raw)?;

    let mut offset = 0usize;
    let count = read_u32(&raw, &mut offset)? as usize;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        let len = read_u32(&raw, &mut offset)? as usize;
        let end = offset.checked_add(len).ok_or(CompressedError::Truncated)?;
        let bytes = raw.get(offset..end).ok_or(CompressedError::Truncated)?;
        strings.push(
            std::str::from_utf8(bytes)
                .map_err(|_| CompressedError::InvalidUtf8)?
                .to_string(),
        );
        offset = end;
    }
    Ok(strings)
}

fn read_u32(raw: &[u8], offset: &mut usize) -> Result<u32, CompressedError> {
    let end = offset.checked_add(4).ok_or(CompressedError::Truncated)?;
    let bytes = raw.get(*offset..end).ok_or(CompressedError::Truncated)?;
    *offset = end;
    Ok(u32::from_le_bytes(bytes.try_into().expect("slice of four")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let strings = vec!["(+ 1 2)".to_string(), "aux".to_string()];
        let packed = compress_strings(&strings).unwrap();
        assert_eq!(decompress_strings(&packed).unwrap(), strings);
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let packed = compress_strings(&["abc".to_string()]).unwrap();
        // corrupt the stream
        assert!(decompress_strings(&packed[..packed.len() / 2]).is_err());
    }
}
