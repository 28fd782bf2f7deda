//! zlib compression for the handshake payload.
//!
//! Only the handshake response is ever compressed, and only when that makes
//! it smaller. Clients detect the compressed form by the zlib header.

use std::io::{self, Read, Write};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};

/// Compress `data` with zlib.
///
/// # Errors
///
/// Propagates I/O errors from the encoder.
pub fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress zlib `data`.
///
/// # Errors
///
/// Returns an error if `data` is not a valid zlib stream.
pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    ZlibDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Returns `true` if `data` starts with a zlib header.
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{deflate, inflate, is_compressed};

    #[test]
    fn inflate_reverses_deflate() {
        let data = br#"{"code":200,"sys":{"heartbeat":10,"dict":{},"serializer":"json"}}"#.repeat(4);
        let packed = deflate(&data).expect("deflate");
        assert!(packed.len() < data.len());
        assert!(is_compressed(&packed));
        assert_eq!(inflate(&packed).expect("inflate"), data);
    }

    #[test]
    fn json_is_not_mistaken_for_zlib() {
        assert!(!is_compressed(br#"{"code":200}"#));
        assert!(!is_compressed(b""));
    }

    #[test]
    fn garbage_fails_to_inflate() {
        assert!(inflate(b"not zlib").is_err());
    }
}
