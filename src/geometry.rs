//! Strip/tile geometry resolution
//!
//! Strips and tiles share one abstraction: a rectangular tiling of the
//! image, indexed row-major with two parallel arrays of offsets and byte
//! counts. Strips are tiles of width `ImageWidth` and height `RowsPerStrip`.

use crate::error::{Result, TiffError};
use crate::ifd::Ifd;
use crate::tags::tag;

/// Resolved strip/tile layout for one image (one set of arrays per plane
/// when the configuration is planar)
#[derive(Debug, Clone)]
pub struct TileGeometry {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_across: u32,
    pub tiles_down: u32,
    /// True when the tile tags were used (false for strips)
    pub is_tiled: bool,
    /// File offsets, row-major, planes concatenated
    pub offsets: Vec<u64>,
    /// Compressed sizes; absent counts are a recoverable condition
    pub byte_counts: Option<Vec<u64>>,
}

impl TileGeometry {
    /// Resolve the layout from the directory. Tile tags win over strip tags
    /// when both are present (the specification forbids mixing them).
    pub fn resolve(
        ifd: &Ifd,
        width: u32,
        height: u32,
        planes: u32,
        compression: u16,
        warn: &mut dyn FnMut(String),
    ) -> Result<Self> {
        let (tile_width, tile_height, is_tiled, offsets, byte_counts) =
            if let Some(offsets) = ifd.get_long_array(tag::TILE_OFFSETS, false)? {
                if ifd.get(tag::STRIP_OFFSETS).is_some() {
                    warn(
                        "Both strip and tile tags present; using tile tags (TIFF 6.0 forbids mixing)"
                            .to_string(),
                    );
                }

                let byte_counts = ifd.get_long_array(tag::TILE_BYTE_COUNTS, false)?;
                if byte_counts.is_none() {
                    warn(format!(
                        "Missing TileByteCounts for tiled TIFF with compression: {}",
                        compression
                    ));
                }

                let tile_width = ifd.get_required_u32(tag::TILE_WIDTH)?;
                let tile_height = ifd.get_required_u32(tag::TILE_LENGTH)?;

                (tile_width, tile_height, true, offsets, byte_counts)
            } else {
                let offsets = ifd
                    .get_long_array(tag::STRIP_OFFSETS, true)?
                    .expect("required array present");

                let byte_counts = ifd.get_long_array(tag::STRIP_BYTE_COUNTS, false)?;
                if byte_counts.is_none() {
                    warn(format!(
                        "Missing StripByteCounts for TIFF with compression: {}",
                        compression
                    ));
                }

                let mut rows_per_strip = ifd.get_u32_or(tag::ROWS_PER_STRIP, height);
                if rows_per_strip == 0 || rows_per_strip > height {
                    rows_per_strip = height;
                }

                (width, rows_per_strip, false, offsets, byte_counts)
            };

        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::InconsistentMetadata(format!(
                "Zero tile dimensions: {}x{}",
                tile_width, tile_height
            )));
        }

        let tiles_across = width.div_ceil(tile_width);
        let tiles_down = height.div_ceil(tile_height);
        let expected = (tiles_across as usize) * (tiles_down as usize) * planes as usize;

        if offsets.len() < expected {
            return Err(TiffError::InconsistentMetadata(format!(
                "Expected {} strip/tile offsets, found {}",
                expected,
                offsets.len()
            )));
        }
        if let Some(counts) = &byte_counts {
            if counts.len() < expected {
                return Err(TiffError::InconsistentMetadata(format!(
                    "Expected {} strip/tile byte counts, found {}",
                    expected,
                    counts.len()
                )));
            }
        }

        Ok(TileGeometry {
            tile_width,
            tile_height,
            tiles_across,
            tiles_down,
            is_tiled,
            offsets,
            byte_counts,
        })
    }

    /// Row-major index of a tile, with planes stored back to back
    pub fn tile_index(&self, plane: u32, tile_x: u32, tile_y: u32) -> usize {
        let per_plane = self.tiles_across as usize * self.tiles_down as usize;
        plane as usize * per_plane
            + tile_y as usize * self.tiles_across as usize
            + tile_x as usize
    }

    /// Valid columns of a tile column index, clipped at the right edge
    pub fn cols_in_tile(&self, tile_x: u32, width: u32) -> u32 {
        self.tile_width.min(width - tile_x * self.tile_width)
    }

    /// Valid rows of a tile row index, clipped at the bottom edge
    pub fn rows_in_tile(&self, tile_y: u32, height: u32) -> u32 {
        self.tile_height.min(height - tile_y * self.tile_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::{IfdEntry, IfdValue};

    fn strip_ifd(rows_per_strip: u32, offsets: Vec<u32>, counts: Option<Vec<u32>>) -> Ifd {
        let mut ifd = Ifd::new();
        ifd.add(IfdEntry::long(tag::ROWS_PER_STRIP, rows_per_strip));
        ifd.add(IfdEntry::new(tag::STRIP_OFFSETS, IfdValue::Longs(offsets)));
        if let Some(c) = counts {
            ifd.add(IfdEntry::new(tag::STRIP_BYTE_COUNTS, IfdValue::Longs(c)));
        }
        ifd
    }

    #[test]
    fn test_strips_as_tiles() {
        let ifd = strip_ifd(4, vec![8, 108, 208], Some(vec![100, 100, 40]));
        let mut warn = |_: String| {};
        let geom = TileGeometry::resolve(&ifd, 25, 10, 1, 1, &mut warn).unwrap();

        assert!(!geom.is_tiled);
        assert_eq!(geom.tile_width, 25);
        assert_eq!(geom.tile_height, 4);
        assert_eq!(geom.tiles_across, 1);
        assert_eq!(geom.tiles_down, 3);
        assert_eq!(geom.rows_in_tile(2, 10), 2); // last strip is partial
        assert_eq!(geom.cols_in_tile(0, 25), 25);
    }

    #[test]
    fn test_tiled_layout_and_edge_tiles() {
        let mut ifd = Ifd::new();
        ifd.add(IfdEntry::long(tag::TILE_WIDTH, 16));
        ifd.add(IfdEntry::long(tag::TILE_LENGTH, 16));
        ifd.add(IfdEntry::new(
            tag::TILE_OFFSETS,
            IfdValue::Longs(vec![0; 6]),
        ));
        ifd.add(IfdEntry::new(
            tag::TILE_BYTE_COUNTS,
            IfdValue::Longs(vec![256; 6]),
        ));

        let mut warn = |_: String| {};
        let geom = TileGeometry::resolve(&ifd, 40, 20, 1, 1, &mut warn).unwrap();

        assert!(geom.is_tiled);
        assert_eq!(geom.tiles_across, 3);
        assert_eq!(geom.tiles_down, 2);
        assert_eq!(geom.cols_in_tile(2, 40), 8);
        assert_eq!(geom.rows_in_tile(1, 20), 4);
        assert_eq!(geom.tile_index(0, 2, 1), 5);
    }

    #[test]
    fn test_tile_tags_win_with_warning() {
        let mut ifd = strip_ifd(8, vec![100], Some(vec![64]));
        ifd.add(IfdEntry::long(tag::TILE_WIDTH, 8));
        ifd.add(IfdEntry::long(tag::TILE_LENGTH, 8));
        ifd.add(IfdEntry::new(tag::TILE_OFFSETS, IfdValue::Longs(vec![200])));
        ifd.add(IfdEntry::new(
            tag::TILE_BYTE_COUNTS,
            IfdValue::Longs(vec![64]),
        ));

        let mut warnings = Vec::new();
        let geom =
            TileGeometry::resolve(&ifd, 8, 8, 1, 1, &mut |w| warnings.push(w)).unwrap();

        assert!(geom.is_tiled);
        assert_eq!(geom.offsets, vec![200]);
        assert!(warnings.iter().any(|w| w.contains("Both strip and tile")));
    }

    #[test]
    fn test_missing_byte_counts_warns() {
        let ifd = strip_ifd(8, vec![8], None);
        let mut warnings = Vec::new();
        let geom =
            TileGeometry::resolve(&ifd, 4, 4, 1, 5, &mut |w| warnings.push(w)).unwrap();

        assert!(geom.byte_counts.is_none());
        assert!(warnings
            .iter()
            .any(|w| w.contains("Missing StripByteCounts") && w.contains("5")));
    }

    #[test]
    fn test_missing_strip_offsets_fails() {
        let ifd = Ifd::new();
        let mut warn = |_: String| {};
        let err = TileGeometry::resolve(&ifd, 4, 4, 1, 1, &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::MissingTag(t) if t == "StripOffsets"));
    }

    #[test]
    fn test_too_few_offsets_fails() {
        let ifd = strip_ifd(2, vec![8], Some(vec![16]));
        let mut warn = |_: String| {};
        let err = TileGeometry::resolve(&ifd, 4, 8, 1, 1, &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::InconsistentMetadata(_)));
    }

    #[test]
    fn test_planar_expects_per_plane_arrays() {
        // 3 planes, 2 strips each
        let ifd = strip_ifd(4, vec![0; 6], Some(vec![32; 6]));
        let mut warn = |_: String| {};
        let geom = TileGeometry::resolve(&ifd, 8, 8, 3, 1, &mut warn).unwrap();
        assert_eq!(geom.tile_index(2, 0, 1), 5);

        let short = strip_ifd(4, vec![0; 2], Some(vec![32; 2]));
        assert!(TileGeometry::resolve(&short, 8, 8, 3, 1, &mut warn).is_err());
    }
}
