//! TIFF type definitions and destination layout selection

use crate::compression::Compression;
use crate::error::{Result, TiffError};
use crate::predictor::Predictor;

/// Photometric interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotometricInterpretation {
    /// WhiteIsZero - min value is white
    WhiteIsZero,
    /// BlackIsZero - min value is black
    BlackIsZero,
    /// RGB color
    #[default]
    Rgb,
    /// Palette color (indexed)
    Palette,
    /// Transparency mask
    TransparencyMask,
    /// CMYK / Separated
    Cmyk,
    /// YCbCr
    YCbCr,
    /// CIE L*a*b*
    CieLab,
}

impl PhotometricInterpretation {
    /// Create from TIFF value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(PhotometricInterpretation::WhiteIsZero),
            1 => Some(PhotometricInterpretation::BlackIsZero),
            2 => Some(PhotometricInterpretation::Rgb),
            3 => Some(PhotometricInterpretation::Palette),
            4 => Some(PhotometricInterpretation::TransparencyMask),
            5 => Some(PhotometricInterpretation::Cmyk),
            6 => Some(PhotometricInterpretation::YCbCr),
            8 => Some(PhotometricInterpretation::CieLab),
            _ => None,
        }
    }

    /// Convert to TIFF value
    pub fn to_u16(self) -> u16 {
        match self {
            PhotometricInterpretation::WhiteIsZero => 0,
            PhotometricInterpretation::BlackIsZero => 1,
            PhotometricInterpretation::Rgb => 2,
            PhotometricInterpretation::Palette => 3,
            PhotometricInterpretation::TransparencyMask => 4,
            PhotometricInterpretation::Cmyk => 5,
            PhotometricInterpretation::YCbCr => 6,
            PhotometricInterpretation::CieLab => 8,
        }
    }
}

/// Planar configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanarConfig {
    /// Chunky format (RGBRGBRGB...)
    #[default]
    Chunky,
    /// Planar format (RRR...GGG...BBB...)
    Planar,
}

impl PlanarConfig {
    /// Create from TIFF value
    pub fn from_u16(value: u16) -> Self {
        match value {
            2 => PlanarConfig::Planar,
            _ => PlanarConfig::Chunky,
        }
    }
}

/// Sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Unsigned integer
    #[default]
    Uint,
    /// Signed integer
    Int,
    /// IEEE floating point
    Float,
    /// Undefined
    Undefined,
}

impl SampleFormat {
    /// Create from TIFF value
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => SampleFormat::Uint,
            2 => SampleFormat::Int,
            3 => SampleFormat::Float,
            _ => SampleFormat::Undefined,
        }
    }
}

/// Meaning of the first extra sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpha {
    /// Unspecified extra data
    Unspecified,
    /// Associated alpha (pre-multiplied)
    Premultiplied,
    /// Unassociated alpha (straight)
    Straight,
}

impl Alpha {
    /// Create from the ExtraSamples tag value
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Alpha::Premultiplied,
            2 => Alpha::Straight,
            _ => Alpha::Unspecified,
        }
    }
}

/// In-memory sample width of the destination raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    U8,
    U16,
    U32,
}

impl TransferType {
    /// Smallest transfer type that holds `bits` bits per sample
    pub fn for_bits(bits: u16) -> Option<Self> {
        match bits {
            1..=8 => Some(TransferType::U8),
            9..=16 => Some(TransferType::U16),
            17..=32 => Some(TransferType::U32),
            _ => None,
        }
    }
}

/// Output color organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Grayscale (1 component)
    Grayscale,
    /// Grayscale with alpha (2 components)
    GrayscaleAlpha,
    /// RGB (3 components)
    Rgb,
    /// RGBA (4 components)
    Rgba,
    /// CMYK (4 components, 5 with alpha)
    Cmyk,
}

/// YCbCr decode parameters from the directory
#[derive(Debug, Clone)]
pub struct YcbcrParams {
    /// Horizontal and vertical chroma subsampling factors
    pub subsampling: (u16, u16),
    /// 1 = centered, 2 = cosited
    pub positioning: u16,
    /// Luma coefficients (Lr, Lg, Lb); defaults to CCIR 601-1
    pub coefficients: [f64; 3],
}

impl Default for YcbcrParams {
    fn default() -> Self {
        YcbcrParams {
            subsampling: (2, 2),
            positioning: 1,
            coefficients: crate::ycbcr::CCIR_601_1_COEFFICIENTS,
        }
    }
}

/// Everything the raster assembler needs to know about one image
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    /// Uniform bits per sample (variable values are rejected earlier)
    pub bits_per_sample: u16,
    pub samples_per_pixel: u16,
    pub photometric: PhotometricInterpretation,
    pub compression: Compression,
    pub predictor: Predictor,
    pub planar: PlanarConfig,
    pub extra_samples: Vec<u16>,
    pub color_map: Option<Vec<u16>>,
    pub icc_profile: Option<Vec<u8>>,
    pub ycbcr: Option<YcbcrParams>,
}

/// Destination pixel layout for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageType {
    pub color_space: ColorSpace,
    pub bands: u16,
    pub transfer: TransferType,
    /// Present when the layout carries an alpha band
    pub alpha: Option<Alpha>,
}

/// Choose the destination layout for a descriptor, exhaustively.
///
/// Palette and YCbCr images expand to 8-bit RGB during decode; everything
/// else keeps its natural band count and sample width. Combinations with no
/// layout are errors, never a silent fallback.
pub fn select_image_type(desc: &ImageDescriptor) -> Result<ImageType> {
    let bits = desc.bits_per_sample;
    let spp = desc.samples_per_pixel;

    match desc.photometric {
        PhotometricInterpretation::WhiteIsZero | PhotometricInterpretation::BlackIsZero => {
            match (spp, bits) {
                (1, 1 | 2 | 4 | 8 | 16 | 32) => Ok(ImageType {
                    color_space: ColorSpace::Grayscale,
                    bands: 1,
                    transfer: TransferType::for_bits(bits).expect("checked bits"),
                    alpha: None,
                }),
                (2, 8 | 16) => {
                    let alpha = first_extra_sample(desc)?;
                    Ok(ImageType {
                        color_space: ColorSpace::GrayscaleAlpha,
                        bands: 2,
                        transfer: TransferType::for_bits(bits).expect("checked bits"),
                        alpha: Some(alpha),
                    })
                }
                _ => Err(TiffError::UnsupportedLayout(format!(
                    "SamplesPerPixel/BitsPerSample {}/{} for bi-level/gray image",
                    spp, bits
                ))),
            }
        }

        PhotometricInterpretation::Rgb => match (spp, bits) {
            (3, 8 | 16) => Ok(ImageType {
                color_space: ColorSpace::Rgb,
                bands: 3,
                transfer: TransferType::for_bits(bits).expect("checked bits"),
                alpha: None,
            }),
            (4, 8 | 16) => {
                let alpha = first_extra_sample(desc)?;
                Ok(ImageType {
                    color_space: ColorSpace::Rgba,
                    bands: 4,
                    transfer: TransferType::for_bits(bits).expect("checked bits"),
                    alpha: Some(alpha),
                })
            }
            _ => Err(TiffError::UnsupportedLayout(format!(
                "SamplesPerPixel/BitsPerSample {}/{} for RGB image (expected 3/8, 4/8, 3/16 or 4/16)",
                spp, bits
            ))),
        },

        PhotometricInterpretation::YCbCr => {
            if spp != 3 {
                return Err(TiffError::InconsistentMetadata(format!(
                    "YCbCr requires SamplesPerPixel == 3, found {}",
                    spp
                )));
            }
            if bits != 8 {
                return Err(TiffError::UnsupportedLayout(format!(
                    "YCbCr requires BitsPerSample == 8, found {}",
                    bits
                )));
            }
            Ok(ImageType {
                color_space: ColorSpace::Rgb,
                bands: 3,
                transfer: TransferType::U8,
                alpha: None,
            })
        }

        PhotometricInterpretation::Palette => {
            if spp != 1 {
                return Err(TiffError::UnsupportedLayout(format!(
                    "SamplesPerPixel {} for palette image (expected 1)",
                    spp
                )));
            }
            if bits == 0 || bits > 16 {
                return Err(TiffError::UnsupportedLayout(format!(
                    "BitsPerSample {} for palette image (expected <= 16)",
                    bits
                )));
            }
            let map = desc
                .color_map
                .as_ref()
                .ok_or_else(|| TiffError::MissingTag("ColorMap".to_string()))?;
            let expected = 3usize * (1usize << bits);
            if map.len() < expected {
                return Err(TiffError::InconsistentMetadata(format!(
                    "ColorMap holds {} entries, {} needed for {}-bit indices",
                    map.len(),
                    expected,
                    bits
                )));
            }
            Ok(ImageType {
                color_space: ColorSpace::Rgb,
                bands: 3,
                transfer: TransferType::U8,
                alpha: None,
            })
        }

        PhotometricInterpretation::Cmyk => match (spp, bits) {
            (4, 8 | 16) => Ok(ImageType {
                color_space: ColorSpace::Cmyk,
                bands: 4,
                transfer: TransferType::for_bits(bits).expect("checked bits"),
                alpha: None,
            }),
            (5, 8 | 16) => {
                let alpha = first_extra_sample(desc)?;
                Ok(ImageType {
                    color_space: ColorSpace::Cmyk,
                    bands: 5,
                    transfer: TransferType::for_bits(bits).expect("checked bits"),
                    alpha: Some(alpha),
                })
            }
            _ => Err(TiffError::UnsupportedLayout(format!(
                "SamplesPerPixel/BitsPerSample {}/{} for separated image (expected 4/8, 4/16, 5/8 or 5/16)",
                spp, bits
            ))),
        },

        PhotometricInterpretation::TransparencyMask | PhotometricInterpretation::CieLab => Err(
            TiffError::UnsupportedPhotometric(desc.photometric.to_u16()),
        ),
    }
}

fn first_extra_sample(desc: &ImageDescriptor) -> Result<Alpha> {
    desc.extra_samples
        .first()
        .map(|&v| Alpha::from_u16(v))
        .ok_or_else(|| TiffError::MissingTag("ExtraSamples".to_string()))
}
