//! Deflate/ZLib decompression
//!
//! Compression ids 8 (Adobe) and 32946 both carry a zlib stream (RFC 1950
//! header and Adler-32 trailer) per the TIFF specification supplement.

use flate2::read::ZlibDecoder;
use std::io::{self, Read};

/// Streaming zlib decoder for TIFF Deflate strips and tiles
pub struct ZlibReader<R: Read> {
    inner: ZlibDecoder<R>,
}

impl<R: Read> ZlibReader<R> {
    /// Create a decoder over a compressed stream
    pub fn new(stream: R) -> Self {
        ZlibReader {
            inner: ZlibDecoder::new(stream),
        }
    }
}

impl<R: Read> Read for ZlibReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let packed = deflate(&data);

        let mut out = Vec::new();
        ZlibReader::new(&packed[..]).read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_zlib_header_present() {
        // RFC 1950: low nibble of the first byte is 8 (deflate)
        let packed = deflate(b"row data");
        assert_eq!(packed[0] & 0x0F, 8);
    }

    #[test]
    fn test_garbage_stream_errors() {
        let mut out = Vec::new();
        let result = ZlibReader::new(&[0xFFu8, 0x00, 0x12, 0x34][..]).read_to_end(&mut out);
        assert!(result.is_err());
    }
}
