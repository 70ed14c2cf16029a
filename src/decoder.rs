//! TIFF decode session and raster assembler
//!
//! A [`TiffDecoder`] owns one input reader, materializes the IFD chain
//! lazily on first query, and decodes any image of the file into a freshly
//! allocated [`Raster`]. Tiles decode in row-major order; within a tile,
//! rows run top to bottom through a pipeline of codec stream, predictor
//! reversal and photometric normalization. Cancellation is cooperative and
//! polled between tiles and between rows.

use crate::compression::{self, Compression};
use crate::error::{Result, TiffError};
use crate::geometry::TileGeometry;
use crate::ifd::{CompoundDirectory, Endian, Ifd};
use crate::jpeg;
use crate::predictor::{self, Predictor};
use crate::raster::Raster;
use crate::tags::tag;
use crate::types::{
    select_image_type, ImageDescriptor, ImageType, PhotometricInterpretation, PlanarConfig,
    TransferType, YcbcrParams,
};
use crate::ycbcr::{YCbCrUpsampler, CCIR_601_1_COEFFICIENTS};
use crate::{TIFF_MAGIC_BE, TIFF_MAGIC_LE, TIFF_VERSION};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read cap for JPEG sub-streams whose byte count tag is absent
const UNKNOWN_LENGTH_CAP: u64 = i16::MAX as u64;

/// Check whether `data` starts like a classic TIFF file
pub fn probe(data: &[u8]) -> bool {
    if data.len() < 8 {
        return false;
    }

    let magic_ok = data[0..2] == TIFF_MAGIC_LE || data[0..2] == TIFF_MAGIC_BE;
    if !magic_ok {
        return false;
    }

    let version = if data[0] == 0x49 {
        LittleEndian::read_u16(&data[2..4])
    } else {
        BigEndian::read_u16(&data[2..4])
    };

    version == TIFF_VERSION
}

/// Optional decode parameters.
///
/// The decoder models the full parameter surface but only accepts the
/// defaults; anything else is rejected with
/// [`TiffError::UnsupportedParam`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeParams {
    /// Source sub-rectangle `(x, y, width, height)`
    pub source_region: Option<(u32, u32, u32, u32)>,
    /// Destination offset `(x, y)`
    pub dest_offset: Option<(u32, u32)>,
    /// Subset of source bands to decode
    pub source_bands: Option<Vec<u16>>,
    /// Subsampling period `(x, y)`
    pub subsampling: Option<(u32, u32)>,
}

impl DecodeParams {
    fn reject_non_default(&self) -> Result<()> {
        let offending = if self.source_region.is_some() {
            Some("source region")
        } else if self.dest_offset.is_some() {
            Some("destination offset")
        } else if self.source_bands.is_some() {
            Some("band subset")
        } else if self.subsampling.is_some() {
            Some("subsampling")
        } else {
            None
        };

        match offending {
            Some(name) => Err(TiffError::UnsupportedParam(name.to_string())),
            None => Ok(()),
        }
    }
}

/// Cloneable handle for cooperative cancellation of a running decode
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request that the current decode stop at the next poll point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

type WarningListener = Box<dyn FnMut(&str)>;
type ProgressListener = Box<dyn FnMut(f32)>;

/// TIFF decode session
pub struct TiffDecoder<R> {
    input: R,
    strict: bool,
    metadata: Option<(CompoundDirectory, Endian)>,
    cancelled: Arc<AtomicBool>,
    warning_listener: Option<WarningListener>,
    progress_listener: Option<ProgressListener>,
}

impl<R: Read + Seek> TiffDecoder<R> {
    /// Open a session over a seekable input. Nothing is read until the
    /// first metadata query.
    pub fn open(input: R) -> Self {
        TiffDecoder {
            input,
            strict: false,
            metadata: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            warning_listener: None,
            progress_listener: None,
        }
    }

    /// Strict mode: metadata irregularities that normally warn become
    /// errors
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Install a warning callback; warnings never abort a decode
    pub fn on_warning(mut self, listener: impl FnMut(&str) + 'static) -> Self {
        self.warning_listener = Some(Box::new(listener));
        self
    }

    /// Install a progress callback receiving percentages in `0.0..=100.0`
    pub fn on_progress(mut self, listener: impl FnMut(f32) + 'static) -> Self {
        self.progress_listener = Some(Box::new(listener));
        self
    }

    /// Handle for cancelling a decode from a progress callback or another
    /// session-owning context
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancelled))
    }

    /// Request cancellation of the current decode
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn emit_warning(&mut self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(listener) = &mut self.warning_listener {
            listener(message);
        }
    }

    fn emit_progress(&mut self, percent: f32) {
        if let Some(listener) = &mut self.progress_listener {
            listener(percent);
        }
    }

    fn ensure_metadata(&mut self) -> Result<()> {
        if self.metadata.is_some() {
            return Ok(());
        }

        let mut warnings = Vec::new();
        let parsed = CompoundDirectory::read(&mut self.input, &mut |w| warnings.push(w))?;

        let strict_failure = if self.strict {
            warnings.first().cloned()
        } else {
            None
        };
        for warning in &warnings {
            self.emit_warning(warning);
        }
        if let Some(message) = strict_failure {
            return Err(TiffError::InconsistentMetadata(message));
        }

        self.metadata = Some(parsed);
        Ok(())
    }

    /// The parsed IFD tree
    pub fn directories(&mut self) -> Result<&CompoundDirectory> {
        self.ensure_metadata()?;
        Ok(&self.metadata.as_ref().expect("metadata cached").0)
    }

    /// The byte order declared by the file header
    pub fn byte_order(&mut self) -> Result<Endian> {
        self.ensure_metadata()?;
        Ok(self.metadata.as_ref().expect("metadata cached").1)
    }

    /// Number of images (top-level IFDs) in the file
    pub fn num_images(&mut self) -> Result<usize> {
        Ok(self.directories()?.directory_count())
    }

    /// Directory of one image
    pub fn directory(&mut self, index: usize) -> Result<&Ifd> {
        let count = self.num_images()?;
        self.directories()?
            .directory(index)
            .ok_or_else(|| {
                TiffError::UnsupportedParam(format!(
                    "image index {} out of bounds ({} images)",
                    index, count
                ))
            })
    }

    /// Width of one image
    pub fn width(&mut self, index: usize) -> Result<u32> {
        self.directory(index)?.get_required_u32(tag::IMAGE_WIDTH)
    }

    /// Height of one image
    pub fn height(&mut self, index: usize) -> Result<u32> {
        self.directory(index)?.get_required_u32(tag::IMAGE_LENGTH)
    }

    /// Raw ICC profile bytes, when the image carries one
    pub fn icc_profile(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        Ok(self
            .directory(index)?
            .get_value(tag::ICC_PROFILE)
            .and_then(|v| v.as_bytes())
            .map(|b| b.to_vec()))
    }

    /// Destination layout the decoder will produce for one image
    pub fn raw_image_type(&mut self, index: usize) -> Result<ImageType> {
        let descriptor = self.descriptor(index)?;
        select_image_type(&descriptor)
    }

    /// Layouts this image can decode into (currently the raw layout only)
    pub fn image_types(&mut self, index: usize) -> Result<impl Iterator<Item = ImageType>> {
        Ok(vec![self.raw_image_type(index)?].into_iter())
    }

    fn descriptor(&mut self, index: usize) -> Result<ImageDescriptor> {
        self.ensure_metadata()?;

        let mut warnings = Vec::new();
        let result = {
            let (directories, _) = self.metadata.as_ref().expect("metadata cached");
            let ifd = directories.directory(index).ok_or_else(|| {
                TiffError::UnsupportedParam(format!(
                    "image index {} out of bounds ({} images)",
                    index,
                    directories.directory_count()
                ))
            })?;
            build_descriptor(ifd, &mut |w| warnings.push(w))
        };

        for warning in &warnings {
            self.emit_warning(warning);
        }

        result
    }

    /// Decode one image into a freshly allocated raster
    pub fn decode(&mut self, index: usize) -> Result<Raster> {
        self.decode_with(index, &DecodeParams::default())
    }

    /// Decode one image with parameters
    pub fn decode_with(&mut self, index: usize, params: &DecodeParams) -> Result<Raster> {
        params.reject_non_default()?;

        // A stale cancel request must not kill the new decode
        self.cancelled.store(false, Ordering::Relaxed);

        let descriptor = self.descriptor(index)?;
        let image_type = select_image_type(&descriptor)?;
        let endian = self.byte_order()?;

        let mut raster = Raster::new(
            descriptor.width,
            descriptor.height,
            image_type.bands,
            image_type.transfer,
        );

        self.emit_progress(0.0);

        match descriptor.compression {
            c if c.is_baseline_stream() => match endian {
                Endian::Little => {
                    self.decode_baseline::<LittleEndian>(index, &descriptor, &mut raster)?
                }
                Endian::Big => {
                    self.decode_baseline::<BigEndian>(index, &descriptor, &mut raster)?
                }
            },
            Compression::Jpeg => {
                self.decode_jpeg_new(index, &descriptor, &image_type, &mut raster)?
            }
            Compression::OldJpeg => {
                self.decode_jpeg_old(index, &descriptor, &image_type, &mut raster)?
            }
            other => return Err(TiffError::UnsupportedCompression(other.to_u16())),
        }

        self.emit_progress(100.0);

        Ok(raster)
    }

    fn resolve_geometry(
        &mut self,
        index: usize,
        descriptor: &ImageDescriptor,
        planes: u32,
    ) -> Result<TileGeometry> {
        let mut warnings = Vec::new();
        let result = {
            let (directories, _) = self.metadata.as_ref().expect("metadata cached");
            let ifd = directories.directory(index).expect("index checked");
            TileGeometry::resolve(
                ifd,
                descriptor.width,
                descriptor.height,
                planes,
                descriptor.compression.to_u16(),
                &mut |w| warnings.push(w),
            )
        };

        for warning in &warnings {
            self.emit_warning(warning);
        }

        result
    }

    fn poll_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Strip/tile pipeline for None, LZW, PackBits and Deflate streams
    fn decode_baseline<B: ByteOrder>(
        &mut self,
        index: usize,
        descriptor: &ImageDescriptor,
        raster: &mut Raster,
    ) -> Result<()> {
        let width = descriptor.width;
        let height = descriptor.height;
        let bits = descriptor.bits_per_sample;

        validate_predictor(descriptor)?;

        let planes = match descriptor.planar {
            PlanarConfig::Planar => descriptor.samples_per_pixel as u32,
            PlanarConfig::Chunky => 1,
        };
        let geometry = self.resolve_geometry(index, descriptor, planes)?;

        // Samples per pixel as stored in the file for one plane
        let file_bands = match descriptor.planar {
            PlanarConfig::Planar => 1usize,
            PlanarConfig::Chunky => descriptor.samples_per_pixel as usize,
        };
        let pred_bands = file_bands;

        let is_ycbcr = descriptor.photometric == PhotometricInterpretation::YCbCr;
        let ycbcr = descriptor.ycbcr.clone().unwrap_or_default();

        // The codec stream borrows the input; poll the flag directly
        let cancelled = Arc::clone(&self.cancelled);

        let total_rows = height as u64 * planes as u64;
        let mut rows_done = 0u64;
        let mut aborted = false;

        'planes: for plane in 0..planes {
            for tile_y in 0..geometry.tiles_down {
                let rows_in_tile = geometry.rows_in_tile(tile_y, height);
                let start_row = tile_y * geometry.tile_height;

                for tile_x in 0..geometry.tiles_across {
                    let cols_in_tile = geometry.cols_in_tile(tile_x, width);
                    let col = tile_x * geometry.tile_width;
                    let tile_index = geometry.tile_index(plane, tile_x, tile_y);

                    self.input
                        .seek(SeekFrom::Start(geometry.offsets[tile_index]))?;

                    let bounded: Box<dyn Read + '_> = match &geometry.byte_counts {
                        Some(counts) => {
                            Box::new((&mut self.input).take(counts[tile_index]))
                        }
                        None => Box::new(&mut self.input),
                    };
                    let decoded =
                        compression::create_decoder(descriptor.compression, bounded)?;
                    let mut stream: Box<dyn Read + '_> = if is_ycbcr {
                        Box::new(YCbCrUpsampler::new(
                            decoded,
                            ycbcr.subsampling,
                            geometry.tile_width,
                            ycbcr.coefficients,
                        ))
                    } else {
                        decoded
                    };

                    for j in 0..rows_in_tile {
                        let y = start_row + j;
                        if y >= height {
                            break;
                        }

                        decode_row::<B>(
                            &mut *stream,
                            descriptor,
                            geometry.tile_width,
                            file_bands,
                            pred_bands,
                            bits,
                            plane as u16,
                            col,
                            y,
                            cols_in_tile,
                            raster,
                        )?;

                        if cancelled.load(Ordering::Relaxed) {
                            aborted = true;
                            break;
                        }
                    }

                    if aborted || cancelled.load(Ordering::Relaxed) {
                        aborted = true;
                        break 'planes;
                    }
                }

                rows_done += rows_in_tile as u64;
                self.emit_progress(100.0 * rows_done as f32 / total_rows as f32);
            }
        }

        if aborted {
            self.emit_warning("Decode aborted by request; raster is partial");
        }

        Ok(())
    }

    /// New-style JPEG (compression 7): shared tables in JPEGTables,
    /// abbreviated image per tile
    fn decode_jpeg_new(
        &mut self,
        index: usize,
        descriptor: &ImageDescriptor,
        image_type: &ImageType,
        raster: &mut Raster,
    ) -> Result<()> {
        validate_jpeg_photometric(descriptor)?;
        if descriptor.planar == PlanarConfig::Planar {
            return Err(TiffError::UnsupportedLayout(
                "planar configuration with JPEG compression".to_string(),
            ));
        }

        let geometry = self.resolve_geometry(index, descriptor, 1)?;

        let tables = {
            let (directories, _) = self.metadata.as_ref().expect("metadata cached");
            directories
                .directory(index)
                .expect("index checked")
                .get_value(tag::JPEG_TABLES)
                .and_then(|v| v.as_bytes())
                .map(|b| b.to_vec())
        };
        if tables.is_none() {
            self.emit_warning("Missing JPEGTables for TIFF with compression: 7 (JPEG)");
        }

        let height = descriptor.height;
        let mut rows_done = 0u64;
        let mut aborted = false;

        'tiles: for tile_y in 0..geometry.tiles_down {
            let rows_in_tile = geometry.rows_in_tile(tile_y, height);
            let start_row = tile_y * geometry.tile_height;

            for tile_x in 0..geometry.tiles_across {
                let col = tile_x * geometry.tile_width;
                let tile_index = geometry.tile_index(0, tile_x, tile_y);

                let body = read_bounded(
                    &mut self.input,
                    geometry.offsets[tile_index],
                    geometry
                        .byte_counts
                        .as_ref()
                        .map(|counts| counts[tile_index]),
                )?;

                let stream = match &tables {
                    Some(tables) => jpeg::splice_tables(tables, &body)?,
                    None => body,
                };

                let tile = jpeg::decode_jfif(&stream, image_type.bands)?;
                raster.blit_block_u8(col, start_row, tile.width, tile.height, &tile.data);

                if self.poll_cancelled() {
                    aborted = true;
                    break 'tiles;
                }
            }

            rows_done += rows_in_tile as u64;
            self.emit_progress(100.0 * rows_done as f32 / height as f32);
        }

        if aborted {
            self.emit_warning("Decode aborted by request; raster is partial");
        }

        Ok(())
    }

    /// Old-style JPEG (compression 6): either a complete interchange
    /// stream, or a stream synthesized per tile from scattered table tags
    fn decode_jpeg_old(
        &mut self,
        index: usize,
        descriptor: &ImageDescriptor,
        image_type: &ImageType,
        raster: &mut Raster,
    ) -> Result<()> {
        validate_jpeg_photometric(descriptor)?;

        // 512/JPEGProc: 1 = baseline, 14 = lossless; 1 assumed when absent
        let (proc_mode, interchange, interchange_length, has_table_tags) = {
            let (directories, _) = self.metadata.as_ref().expect("metadata cached");
            let ifd = directories.directory(index).expect("index checked");
            (
                ifd.get_u16_or(tag::OLD_JPEG_PROC, 1),
                ifd.get_value(tag::JPEG_INTERCHANGE_FORMAT).and_then(|v| v.as_u32()),
                ifd.get_value(tag::JPEG_INTERCHANGE_FORMAT_LENGTH)
                    .and_then(|v| v.as_u32()),
                ifd.get(tag::OLD_JPEG_Q_TABLES).is_some()
                    || ifd.get(tag::OLD_JPEG_DC_TABLES).is_some()
                    || ifd.get(tag::OLD_JPEG_AC_TABLES).is_some(),
            )
        };

        match proc_mode {
            1 => {}
            14 => {
                return Err(TiffError::UnsupportedFeature(
                    "old-style JPEG processing mode: lossless (14)".to_string(),
                ))
            }
            other => {
                return Err(TiffError::UnsupportedFeature(format!(
                    "unknown old-style JPEG processing mode: {}",
                    other
                )))
            }
        }

        if let Some(offset) = interchange {
            // Complete JFIF stream: decode as a single tile, ignoring any
            // tiling and table tags
            if has_table_tags {
                self.emit_warning(
                    "Old-style JPEG compressed TIFF with JFIF stream encountered. \
                     Ignoring JPEG tables. Reading as single tile.",
                );
            } else {
                self.emit_warning(
                    "Old-style JPEG compressed TIFF with JFIF stream encountered. \
                     Reading as single tile.",
                );
            }

            let stream = read_bounded(
                &mut self.input,
                offset as u64,
                interchange_length.map(|l| l as u64),
            )?;
            let tile = jpeg::decode_jfif(&stream, image_type.bands)?;
            raster.blit_block_u8(0, 0, tile.width, tile.height, &tile.data);

            self.emit_progress(100.0);
            return Ok(());
        }

        // The hard way: re-create a JFIF stream per tile
        self.emit_warning(
            "Old-style JPEG compressed TIFF without JFIF stream encountered. \
             Attempting to re-create JFIF stream.",
        );

        let (q_offsets, dc_offsets, ac_offsets) = {
            let (directories, _) = self.metadata.as_ref().expect("metadata cached");
            let ifd = directories.directory(index).expect("index checked");
            (
                ifd.get_long_array(tag::OLD_JPEG_Q_TABLES, true)?
                    .expect("required array present"),
                ifd.get_long_array(tag::OLD_JPEG_DC_TABLES, true)?
                    .expect("required array present"),
                ifd.get_long_array(tag::OLD_JPEG_AC_TABLES, true)?
                    .expect("required array present"),
            )
        };

        let mut warnings = Vec::new();
        let tables = jpeg::read_old_tables(
            &mut self.input,
            &q_offsets,
            &dc_offsets,
            &ac_offsets,
            &mut |w| warnings.push(w),
        )?;
        for warning in &warnings {
            self.emit_warning(warning);
        }

        let geometry = self.resolve_geometry(index, descriptor, 1)?;
        let height = descriptor.height;
        let num_bands = descriptor.samples_per_pixel;
        let mut rows_done = 0u64;
        let mut aborted = false;

        'tiles: for tile_y in 0..geometry.tiles_down {
            let rows_in_tile = geometry.rows_in_tile(tile_y, height);
            let start_row = tile_y * geometry.tile_height;

            for tile_x in 0..geometry.tiles_across {
                let col = tile_x * geometry.tile_width;
                let tile_index = geometry.tile_index(0, tile_x, tile_y);

                let body = read_bounded(
                    &mut self.input,
                    geometry.offsets[tile_index],
                    geometry
                        .byte_counts
                        .as_ref()
                        .map(|counts| counts[tile_index]),
                )?;

                let stream = jpeg::synthesize_tile(
                    num_bands,
                    geometry.tile_width,
                    geometry.tile_height,
                    &tables,
                    &body,
                );

                let tile = jpeg::decode_jfif(&stream, image_type.bands)?;
                raster.blit_block_u8(col, start_row, tile.width, tile.height, &tile.data);

                if self.poll_cancelled() {
                    aborted = true;
                    break 'tiles;
                }
            }

            rows_done += rows_in_tile as u64;
            self.emit_progress(100.0 * rows_done as f32 / height as f32);
        }

        if aborted {
            self.emit_warning("Decode aborted by request; raster is partial");
        }

        Ok(())
    }
}

/// Seek and read `length` bytes, or up to a fixed cap when the length is
/// unknown
fn read_bounded<R: Read + Seek>(
    input: &mut R,
    offset: u64,
    length: Option<u64>,
) -> Result<Vec<u8>> {
    input.seek(SeekFrom::Start(offset))?;
    match length {
        Some(length) => {
            let mut buf = vec![0u8; length as usize];
            input.read_exact(&mut buf)?;
            Ok(buf)
        }
        None => {
            let mut buf = Vec::new();
            input.take(UNKNOWN_LENGTH_CAP).read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn validate_predictor(descriptor: &ImageDescriptor) -> Result<()> {
    match descriptor.predictor {
        Predictor::None => Ok(()),
        Predictor::Horizontal => {
            if matches!(descriptor.bits_per_sample, 8 | 16 | 32) {
                Ok(())
            } else {
                Err(TiffError::UnsupportedPredictor(2))
            }
        }
        Predictor::FloatingPoint => Err(TiffError::UnsupportedPredictor(3)),
    }
}

/// The JPEG paths hand color conversion to the JPEG decoder, which covers
/// grayscale, RGB and YCbCr; separated and Lab data would come back in the
/// wrong color model
fn validate_jpeg_photometric(descriptor: &ImageDescriptor) -> Result<()> {
    match descriptor.photometric {
        PhotometricInterpretation::WhiteIsZero
        | PhotometricInterpretation::BlackIsZero
        | PhotometricInterpretation::Rgb
        | PhotometricInterpretation::YCbCr => Ok(()),
        other => Err(TiffError::UnsupportedPhotometric(other.to_u16())),
    }
}

/// Map decode failures from codec streams to codec errors, leaving real
/// I/O failures alone
fn map_stream_error(error: std::io::Error, compression: Compression) -> TiffError {
    if error.kind() == std::io::ErrorKind::InvalidData {
        TiffError::Codec {
            codec: compression.name(),
            detail: error.to_string(),
        }
    } else {
        TiffError::Io(error)
    }
}

/// Read, unpredict, normalize and blit one tile row.
///
/// The row is read at the width of the samples in the file, which for
/// palette images can be wider than the 8-bit destination.
#[allow(clippy::too_many_arguments)]
fn decode_row<B: ByteOrder>(
    stream: &mut dyn Read,
    descriptor: &ImageDescriptor,
    tile_width: u32,
    file_bands: usize,
    pred_bands: usize,
    bits: u16,
    plane: u16,
    col: u32,
    y: u32,
    cols_in_tile: u32,
    raster: &mut Raster,
) -> Result<()> {
    let samples = tile_width as usize * file_bands;
    let planar = descriptor.planar == PlanarConfig::Planar;
    let white_is_zero =
        descriptor.photometric == PhotometricInterpretation::WhiteIsZero;
    let file_transfer = TransferType::for_bits(bits).ok_or_else(|| {
        TiffError::UnsupportedLayout(format!("BitsPerSample {}", bits))
    })?;

    match file_transfer {
        TransferType::U8 => {
            let mut row = vec![0u8; samples];
            if bits < 8 {
                // Sub-byte samples arrive packed, high bits first
                let packed_len = (samples * bits as usize).div_ceil(8);
                let mut packed = vec![0u8; packed_len];
                stream
                    .read_exact(&mut packed)
                    .map_err(|e| map_stream_error(e, descriptor.compression))?;
                unpack_bits(&packed, bits, &mut row);
            } else {
                stream
                    .read_exact(&mut row)
                    .map_err(|e| map_stream_error(e, descriptor.compression))?;
            }

            if descriptor.predictor == Predictor::Horizontal {
                predictor::reverse_horizontal(&mut row, pred_bands);
            }

            if descriptor.photometric == PhotometricInterpretation::Palette {
                let map = descriptor.color_map.as_ref().expect("layout checked");
                let rgb = expand_palette_u8(&row, map);
                raster.blit_row_u8(col, y, &rgb, cols_in_tile);
                return Ok(());
            }

            if white_is_zero {
                let max = max_sample_u8(bits);
                for v in &mut row {
                    *v = max - *v;
                }
            }

            if planar {
                raster.blit_band_row_u8(col, y, plane, &row, cols_in_tile);
            } else {
                raster.blit_row_u8(col, y, &row, cols_in_tile);
            }
        }

        TransferType::U16 => {
            let mut row = vec![0u16; samples];
            stream
                .read_u16_into::<B>(&mut row)
                .map_err(|e| map_stream_error(e, descriptor.compression))?;

            if descriptor.predictor == Predictor::Horizontal {
                predictor::reverse_horizontal(&mut row, pred_bands);
            }

            if descriptor.photometric == PhotometricInterpretation::Palette {
                let map = descriptor.color_map.as_ref().expect("layout checked");
                let rgb = expand_palette_u16(&row, map);
                raster.blit_row_u8(col, y, &rgb, cols_in_tile);
                return Ok(());
            }

            if white_is_zero {
                for v in &mut row {
                    *v = 0xFFFF - *v;
                }
            }

            if planar {
                raster.blit_band_row_u16(col, y, plane, &row, cols_in_tile);
            } else {
                raster.blit_row_u16(col, y, &row, cols_in_tile);
            }
        }

        TransferType::U32 => {
            let mut row = vec![0u32; samples];
            stream
                .read_u32_into::<B>(&mut row)
                .map_err(|e| map_stream_error(e, descriptor.compression))?;

            if descriptor.predictor == Predictor::Horizontal {
                predictor::reverse_horizontal(&mut row, pred_bands);
            }

            if white_is_zero {
                for v in &mut row {
                    *v = !*v;
                }
            }

            if planar {
                raster.blit_band_row_u32(col, y, plane, &row, cols_in_tile);
            } else {
                raster.blit_row_u32(col, y, &row, cols_in_tile);
            }
        }
    }

    Ok(())
}

fn max_sample_u8(bits: u16) -> u8 {
    if bits >= 8 {
        0xFF
    } else {
        ((1u16 << bits) - 1) as u8
    }
}

/// Expand packed sub-byte samples to one byte each, MSB-first within a byte
fn unpack_bits(packed: &[u8], bits: u16, out: &mut [u8]) {
    let bits = bits as usize;
    let mask = ((1u16 << bits) - 1) as u8;
    for (i, sample) in out.iter_mut().enumerate() {
        let bit = i * bits;
        let byte = packed[bit / 8];
        let shift = 8 - bits - (bit % 8);
        *sample = (byte >> shift) & mask;
    }
}

/// Look 8-bit indices up in the ColorMap, scaling 16-bit entries down
fn expand_palette_u8(indices: &[u8], map: &[u16]) -> Vec<u8> {
    let entries = map.len() / 3;
    let mut rgb = Vec::with_capacity(indices.len() * 3);
    for &index in indices {
        let i = (index as usize).min(entries - 1);
        rgb.push((map[i] / 256) as u8);
        rgb.push((map[entries + i] / 256) as u8);
        rgb.push((map[2 * entries + i] / 256) as u8);
    }
    rgb
}

/// Look 16-bit indices up in the ColorMap
fn expand_palette_u16(indices: &[u16], map: &[u16]) -> Vec<u8> {
    let entries = map.len() / 3;
    let mut rgb = Vec::with_capacity(indices.len() * 3);
    for &index in indices {
        let i = (index as usize).min(entries - 1);
        rgb.push((map[i] / 256) as u8);
        rgb.push((map[entries + i] / 256) as u8);
        rgb.push((map[2 * entries + i] / 256) as u8);
    }
    rgb
}

/// Derive the image descriptor the assembler works from
fn build_descriptor(
    ifd: &Ifd,
    warn: &mut dyn FnMut(String),
) -> Result<ImageDescriptor> {
    let width = ifd.get_required_u32(tag::IMAGE_WIDTH)?;
    let height = ifd.get_required_u32(tag::IMAGE_LENGTH)?;

    // SampleFormat: only uniform unsigned integer data is decodable
    if let Some(formats) = ifd.get_long_array(tag::SAMPLE_FORMAT, false)? {
        if formats.windows(2).any(|w| w[0] != w[1]) {
            return Err(TiffError::InconsistentMetadata(format!(
                "variable SampleFormat: {:?}",
                formats
            )));
        }
        if formats.first().copied().unwrap_or(1) != 1 {
            return Err(TiffError::UnsupportedLayout(format!(
                "SampleFormat {} (expected 1, unsigned integer)",
                formats[0]
            )));
        }
    }

    let bits_per_sample = match ifd.get_long_array(tag::BITS_PER_SAMPLE, false)? {
        None => 1,
        Some(values) if values.is_empty() => 1,
        Some(values) => {
            if values.windows(2).any(|w| w[0] != w[1]) {
                return Err(TiffError::InconsistentMetadata(format!(
                    "variable BitsPerSample: {:?}",
                    values
                )));
            }
            values[0] as u16
        }
    };

    let samples_per_pixel = ifd.get_u16_or(tag::SAMPLES_PER_PIXEL, 1);

    let photometric_value = ifd.get_required_u16(tag::PHOTOMETRIC_INTERPRETATION)?;
    let photometric = PhotometricInterpretation::from_u16(photometric_value)
        .ok_or(TiffError::UnsupportedPhotometric(photometric_value))?;

    let compression_value = ifd.get_u16_or(tag::COMPRESSION, 1);
    let compression = Compression::from_u16(compression_value)
        .ok_or(TiffError::UnsupportedCompression(compression_value))?;

    let predictor_value = ifd.get_u16_or(tag::PREDICTOR, 1);
    let predictor = Predictor::from_u16(predictor_value)
        .ok_or(TiffError::UnsupportedPredictor(predictor_value))?;

    let planar = PlanarConfig::from_u16(ifd.get_u16_or(tag::PLANAR_CONFIGURATION, 1));

    let extra_samples = ifd
        .get_value(tag::EXTRA_SAMPLES)
        .and_then(|v| v.as_u16_vec())
        .unwrap_or_default();

    let color_map = match ifd.get_value(tag::COLOR_MAP) {
        Some(crate::ifd::IfdValue::Shorts(v)) => Some(v.clone()),
        _ => None,
    };

    let icc_profile = ifd
        .get_value(tag::ICC_PROFILE)
        .and_then(|v| v.as_bytes())
        .map(|b| b.to_vec());

    let ycbcr = if photometric == PhotometricInterpretation::YCbCr {
        Some(read_ycbcr_params(ifd, warn)?)
    } else {
        None
    };

    Ok(ImageDescriptor {
        width,
        height,
        bits_per_sample,
        samples_per_pixel,
        photometric,
        compression,
        predictor,
        planar,
        extra_samples,
        color_map,
        icc_profile,
        ycbcr,
    })
}

fn read_ycbcr_params(ifd: &Ifd, warn: &mut dyn FnMut(String)) -> Result<YcbcrParams> {
    let positioning = ifd.get_u16_or(tag::YCBCR_POSITIONING, 1);
    if positioning != 1 && positioning != 2 {
        warn(format!(
            "Unknown YCbCrPositioning value, expected 1 or 2: {}",
            positioning
        ));
    }

    let subsampling = match ifd.get_value(tag::YCBCR_SUB_SAMPLING) {
        Some(value) => {
            let factors = value.as_u16_vec().unwrap_or_default();
            if factors.len() != 2
                || !matches!(factors[0], 1 | 2 | 4)
                || !matches!(factors[1], 1 | 2 | 4)
            {
                return Err(TiffError::InconsistentMetadata(format!(
                    "bad YCbCrSubSampling value: {:?}",
                    factors
                )));
            }
            if factors[0] < factors[1] {
                warn(format!(
                    "Unusual YCbCr subsampling, expected horizontal >= vertical: {:?}",
                    factors
                ));
            }
            (factors[0], factors[1])
        }
        None => (2, 2),
    };

    let coefficients = match ifd.get_value(tag::YCBCR_COEFFICIENTS) {
        Some(value) => {
            let rationals = value.as_rationals().unwrap_or(&[]);
            if rationals.len() == 3 && rationals.iter().all(|&(_, d)| d != 0) {
                [
                    rationals[0].0 as f64 / rationals[0].1 as f64,
                    rationals[1].0 as f64 / rationals[1].1 as f64,
                    rationals[2].0 as f64 / rationals[2].1 as f64,
                ]
            } else {
                warn("Invalid YCbCrCoefficients, using CCIR 601-1 defaults".to_string());
                CCIR_601_1_COEFFICIENTS
            }
        }
        None => CCIR_601_1_COEFFICIENTS,
    };

    Ok(YcbcrParams {
        subsampling,
        positioning,
        coefficients,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_little_endian() {
        let data = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(probe(&data));
    }

    #[test]
    fn test_probe_big_endian() {
        let data = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        assert!(probe(&data));
    }

    #[test]
    fn test_probe_invalid() {
        let data = [0x89, 0x50, 0x4E, 0x47]; // PNG magic
        assert!(!probe(&data));
    }

    #[test]
    fn test_probe_bigtiff() {
        let data = [0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(!probe(&data));
    }

    #[test]
    fn test_probe_too_short() {
        let data = [0x49, 0x49];
        assert!(!probe(&data));
    }

    #[test]
    fn test_unpack_bits() {
        let mut out = [0u8; 8];
        unpack_bits(&[0b10110100], 1, &mut out);
        assert_eq!(out, [1, 0, 1, 1, 0, 1, 0, 0]);

        let mut out = [0u8; 4];
        unpack_bits(&[0b11100100], 2, &mut out);
        assert_eq!(out, [3, 2, 1, 0]);

        let mut out = [0u8; 3];
        unpack_bits(&[0xAB, 0xC0], 4, &mut out);
        assert_eq!(out, [0xA, 0xB, 0xC]);
    }

    #[test]
    fn test_max_sample() {
        assert_eq!(max_sample_u8(1), 1);
        assert_eq!(max_sample_u8(4), 15);
        assert_eq!(max_sample_u8(8), 255);
    }

    #[test]
    fn test_palette_expansion_law() {
        // 3 * 2^k table of 16-bit entries scales down with a divide by 256
        let k = 2;
        let entries = 1usize << k;
        let mut map = vec![0u16; 3 * entries];
        map[1] = 0xFF00; // red of index 1
        map[entries + 2] = 0x8000; // green of index 2
        map[2 * entries + 3] = 0x0100; // blue of index 3

        let rgb = expand_palette_u8(&[0, 1, 2, 3], &map);
        assert_eq!(rgb[0..3], [0, 0, 0]);
        assert_eq!(rgb[3..6], [0xFF, 0, 0]);
        assert_eq!(rgb[6..9], [0, 0x80, 0]);
        assert_eq!(rgb[9..12], [0, 0, 1]);
    }

    #[test]
    fn test_decode_params_rejection() {
        assert!(DecodeParams::default().reject_non_default().is_ok());

        let params = DecodeParams {
            source_region: Some((0, 0, 10, 10)),
            ..Default::default()
        };
        assert!(matches!(
            params.reject_non_default().unwrap_err(),
            TiffError::UnsupportedParam(p) if p == "source region"
        ));

        let params = DecodeParams {
            subsampling: Some((2, 2)),
            ..Default::default()
        };
        assert!(params.reject_non_default().is_err());
    }

    #[test]
    fn test_cancel_token() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = CancelToken(Arc::clone(&flag));
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(flag.load(Ordering::Relaxed));
    }
}
