//! TIFF image decoder
//!
//! Tagged Image File Format (TIFF) is a flexible container format for raster
//! images, commonly used in archival, geospatial and prepress workflows. A
//! single file holds one or more Image File Directories (IFDs), each
//! describing one image with its own compression, color model and layout.
//!
//! # Features
//!
//! - Classic TIFF (magic 42), both byte orders, multi-page files
//! - Strip and tile layouts, including partial edge tiles
//! - Compression: None, LZW (both bit orders), PackBits, Deflate/ZLib,
//!   new-style JPEG (shared tables) and old-style JPEG (synthesized streams)
//! - Horizontal differencing predictor for 8/16/32 bit samples
//! - Photometric handling: grayscale (both polarities), RGB, palette
//!   expansion, CMYK passthrough, YCbCr upsampling to RGB
//! - Sub-IFD (EXIF/GPS) metadata trees with cycle detection
//!
//! # Example
//!
//! ```ignore
//! use tiffdec::TiffDecoder;
//!
//! let mut decoder = TiffDecoder::open(std::io::Cursor::new(tiff_data));
//! let pages = decoder.num_images()?;
//! let raster = decoder.decode(0)?;
//! ```

pub mod compression;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod ifd;
pub mod jpeg;
pub mod predictor;
pub mod raster;
pub mod tags;
pub mod types;
pub mod ycbcr;

pub use compression::Compression;
pub use decoder::{probe, CancelToken, DecodeParams, TiffDecoder};
pub use error::{Result, TiffError};
pub use ifd::{CompoundDirectory, Endian, Ifd, IfdEntry, IfdValue};
pub use raster::Raster;
pub use types::{ImageType, PhotometricInterpretation};

/// TIFF magic number - little endian "II"
pub const TIFF_MAGIC_LE: [u8; 2] = [0x49, 0x49];

/// TIFF magic number - big endian "MM"
pub const TIFF_MAGIC_BE: [u8; 2] = [0x4D, 0x4D];

/// TIFF version (42)
pub const TIFF_VERSION: u16 = 42;

/// BigTIFF version (43)
pub const BIGTIFF_VERSION: u16 = 43;
