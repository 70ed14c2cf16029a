//! TIFF compression methods
//!
//! Each supported scheme exposes a streaming decoder: the raster assembler
//! hands it a length-bounded view of the file and reads decoded rows out the
//! other end. JPEG variants are not streamed row-wise; the JPEG interop path
//! handles them tile-at-a-time.

mod deflate;
mod lzw;
mod packbits;

pub use deflate::ZlibReader;
pub use lzw::{BitOrder, LzwReader};
pub use packbits::PackBitsReader;

use crate::error::{Result, TiffError};
use std::io::Read;

/// Compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// CCITT modified Huffman RLE
    CcittHuffman,
    /// CCITT Group 3 fax encoding (T.4)
    CcittT4,
    /// CCITT Group 4 fax encoding (T.6)
    CcittT6,
    /// LZW compression
    Lzw,
    /// JPEG compression (old-style)
    OldJpeg,
    /// JPEG compression
    Jpeg,
    /// Deflate/ZIP compression (Adobe)
    AdobeDeflate,
    /// PackBits RLE compression
    PackBits,
    /// Deflate compression
    Deflate,
}

impl Compression {
    /// Create from TIFF compression tag value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            2 => Some(Compression::CcittHuffman),
            3 => Some(Compression::CcittT4),
            4 => Some(Compression::CcittT6),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::AdobeDeflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::Deflate),
            _ => None,
        }
    }

    /// Convert to TIFF compression tag value
    pub fn to_u16(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::CcittHuffman => 2,
            Compression::CcittT4 => 3,
            Compression::CcittT6 => 4,
            Compression::Lzw => 5,
            Compression::OldJpeg => 6,
            Compression::Jpeg => 7,
            Compression::AdobeDeflate => 8,
            Compression::PackBits => 32773,
            Compression::Deflate => 32946,
        }
    }

    /// Get compression name
    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::CcittHuffman => "CCITT Modified Huffman",
            Compression::CcittT4 => "CCITT Group 3",
            Compression::CcittT6 => "CCITT Group 4",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::PackBits => "PackBits",
            Compression::Deflate => "Deflate",
        }
    }

    /// True for schemes the row pipeline decodes as a byte stream.
    /// JPEG variants go through the JPEG interop path instead.
    pub fn is_baseline_stream(self) -> bool {
        matches!(
            self,
            Compression::None
                | Compression::Lzw
                | Compression::PackBits
                | Compression::AdobeDeflate
                | Compression::Deflate
        )
    }
}

/// Wrap a (bounded) compressed stream with the matching streaming decoder.
///
/// For [`Compression::None`] the stream passes through untouched. LZW sniffs
/// the legacy bit order from the first two compressed bytes by itself.
pub fn create_decoder<'a, R: Read + 'a>(
    compression: Compression,
    stream: R,
) -> Result<Box<dyn Read + 'a>> {
    match compression {
        Compression::None => Ok(Box::new(stream)),
        Compression::PackBits => Ok(Box::new(PackBitsReader::new(stream))),
        Compression::Lzw => Ok(Box::new(LzwReader::new(stream))),
        // TIFF specification supplement 2 says ZLib (8) and Deflate (32946)
        // streams are identical
        Compression::AdobeDeflate | Compression::Deflate => {
            Ok(Box::new(ZlibReader::new(stream)))
        }
        other => Err(TiffError::UnsupportedCompression(other.to_u16())),
    }
}
