//! JPEG interop
//!
//! Two TIFF flavors of embedded JPEG exist. New-style (compression 7) keeps
//! an abbreviated table stream in `JPEGTables` shared by every tile, with
//! each tile holding an abbreviated image; the host JPEG decoder wants one
//! self-contained stream, so tables and tile body are spliced together.
//! Old-style (compression 6) either points at a complete JFIF stream
//! (`JPEGInterchangeFormat`) or scatters raw quantization/Huffman tables
//! across tags, in which case a baseline JFIF stream is synthesized from
//! scratch for every tile.

use crate::error::{Result, TiffError};
use std::io::{Read, Seek, SeekFrom};
use zune_jpeg::JpegDecoder;

/// JPEG marker codes
pub mod marker {
    pub const SOI: u16 = 0xFFD8;
    pub const EOI: u16 = 0xFFD9;
    pub const SOS: u16 = 0xFFDA;
    pub const DQT: u16 = 0xFFDB;
    pub const DHT: u16 = 0xFFC4;
    pub const SOF0: u16 = 0xFFC0;
}

/// A quantization table is 64 bytes, one per DCT coefficient
pub const Q_TABLE_LEN: usize = 64;

/// A Huffman table begins with 16 code-length counts
pub const HUFFMAN_LENGTH_COUNTS: usize = 16;

/// One decoded tile, always 8-bit samples
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub data: Vec<u8>,
}

/// Decode a complete JFIF stream, normalizing to `expected_bands`
/// interleaved samples per pixel
pub fn decode_jfif(stream: &[u8], expected_bands: u16) -> Result<DecodedTile> {
    let mut decoder = JpegDecoder::new(stream);
    let pixels = decoder
        .decode()
        .map_err(|e| TiffError::codec("jpeg", e.to_string()))?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| TiffError::codec("jpeg", "decoder reported no dimensions"))?;
    let components = decoder
        .get_output_colorspace()
        .map(|c| c.num_components())
        .unwrap_or(0);

    let data = match (components, expected_bands) {
        (c, b) if c == b as usize => pixels,
        (1, 3) => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
        (c, b) => {
            return Err(TiffError::InconsistentMetadata(format!(
                "JPEG stream has {} components, destination expects {}",
                c, b
            )))
        }
    };

    Ok(DecodedTile {
        width: width as u32,
        height: height as u32,
        bands: expected_bands,
        data,
    })
}

/// Join an abbreviated table stream and an abbreviated image into one JFIF
/// stream: the tables' trailing EOI and the body's leading SOI are dropped.
pub fn splice_tables(tables: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    if tables.len() < 4 || read_marker(&tables[tables.len() - 2..]) != marker::EOI {
        return Err(TiffError::codec(
            "jpeg",
            "JPEGTables stream does not end with an EOI marker",
        ));
    }
    if body.len() < 2 || read_marker(body) != marker::SOI {
        return Err(TiffError::codec(
            "jpeg",
            "tile stream does not start with an SOI marker",
        ));
    }

    let mut stream = Vec::with_capacity(tables.len() + body.len() - 4);
    stream.extend_from_slice(&tables[..tables.len() - 2]);
    stream.extend_from_slice(&body[2..]);
    Ok(stream)
}

fn read_marker(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Raw table payloads read from the old-style JPEG table tags
pub struct OldJpegTables {
    /// Zigzag-order quantization tables, 64 bytes each
    pub q: Vec<Vec<u8>>,
    /// DC Huffman tables: 16 length counts + values
    pub dc: Vec<Vec<u8>>,
    /// AC Huffman tables: 16 length counts + values
    pub ac: Vec<Vec<u8>>,
}

/// Read the per-component table arrays the old-style tags point at.
///
/// Table lengths are canonical: 64 bytes for quantization, and the 16 `Li`
/// counts describe a Huffman table's own length. The adjacent-offset
/// arithmetic the tags invite is only used as a sanity cross-check; real
/// files get it wrong often enough that trusting it loses images.
pub fn read_old_tables<R: Read + Seek>(
    reader: &mut R,
    q_offsets: &[u64],
    dc_offsets: &[u64],
    ac_offsets: &[u64],
    warn: &mut dyn FnMut(String),
) -> Result<OldJpegTables> {
    let q = q_offsets
        .iter()
        .map(|&offset| {
            reader.seek(SeekFrom::Start(offset))?;
            let mut table = vec![0u8; Q_TABLE_LEN];
            reader.read_exact(&mut table)?;
            Ok(table)
        })
        .collect::<Result<Vec<_>>>()?;
    cross_check_offsets("JPEGQTables", q_offsets, &q, warn);

    let dc = read_huffman_tables(reader, dc_offsets)?;
    cross_check_offsets("JPEGDCTables", dc_offsets, &dc, warn);

    let ac = read_huffman_tables(reader, ac_offsets)?;
    cross_check_offsets("JPEGACTables", ac_offsets, &ac, warn);

    Ok(OldJpegTables { q, dc, ac })
}

fn read_huffman_tables<R: Read + Seek>(reader: &mut R, offsets: &[u64]) -> Result<Vec<Vec<u8>>> {
    offsets
        .iter()
        .map(|&offset| {
            reader.seek(SeekFrom::Start(offset))?;
            let mut table = vec![0u8; HUFFMAN_LENGTH_COUNTS];
            reader.read_exact(&mut table)?;

            let values: usize = table.iter().map(|&c| c as usize).sum();
            table.resize(HUFFMAN_LENGTH_COUNTS + values, 0);
            reader.read_exact(&mut table[HUFFMAN_LENGTH_COUNTS..])?;
            Ok(table)
        })
        .collect()
}

fn cross_check_offsets(
    tag: &str,
    offsets: &[u64],
    tables: &[Vec<u8>],
    warn: &mut dyn FnMut(String),
) {
    for i in 0..offsets.len().saturating_sub(1) {
        let span = offsets[i + 1].saturating_sub(offsets[i]);
        if span != 0 && span != tables[i].len() as u64 {
            warn(format!(
                "{} offset spacing {} disagrees with table length {}; trusting the canonical length",
                tag,
                span,
                tables[i].len()
            ));
        }
    }
}

/// Build a complete baseline JFIF stream for one old-style tile.
///
/// Marker order: SOI, SOF0, one DQT per quantization table, one DHT per
/// DC table (class 0) and per AC table (class 1), SOS, entropy-coded body,
/// EOI. The scan header ends with `Ss = 0x00, Se = 0x3F, AhAl = 0x00`, the
/// baseline full-frequency scan.
pub fn synthesize_tile(
    num_bands: u16,
    tile_width: u32,
    tile_height: u32,
    tables: &OldJpegTables,
    body: &[u8],
) -> Vec<u8> {
    let n = num_bands as usize;
    let mut out = Vec::with_capacity(
        2 + (10 + 3 * n)
            + tables.q.iter().map(|t| 4 + 1 + t.len()).sum::<usize>()
            + tables.dc.iter().map(|t| 4 + 1 + t.len()).sum::<usize>()
            + tables.ac.iter().map(|t| 4 + 1 + t.len()).sum::<usize>()
            + (10 + 2 * n)
            + body.len()
            + 2,
    );

    put_u16(&mut out, marker::SOI);

    put_u16(&mut out, marker::SOF0);
    put_u16(&mut out, (8 + 3 * n) as u16);
    out.push(8); // sample precision
    put_u16(&mut out, tile_height as u16);
    put_u16(&mut out, tile_width as u16);
    out.push(n as u8);
    for comp in 0..n {
        out.push(comp as u8); // component id
        // TODO: derive the sampling factors from YCbCrSubSampling
        out.push(if comp == 0 { 0x22 } else { 0x11 });
        out.push(comp.min(tables.q.len().saturating_sub(1)) as u8);
    }

    for (index, table) in tables.q.iter().enumerate() {
        put_u16(&mut out, marker::DQT);
        put_u16(&mut out, (3 + table.len()) as u16);
        out.push(index as u8);
        out.extend_from_slice(table);
    }

    for (index, table) in tables.dc.iter().enumerate() {
        put_u16(&mut out, marker::DHT);
        put_u16(&mut out, (3 + table.len()) as u16);
        out.push(index as u8); // class 0 (DC)
        out.extend_from_slice(table);
    }

    for (index, table) in tables.ac.iter().enumerate() {
        put_u16(&mut out, marker::DHT);
        put_u16(&mut out, (3 + table.len()) as u16);
        out.push(0x10 | (index as u8 & 0x0F)); // class 1 (AC)
        out.extend_from_slice(table);
    }

    put_u16(&mut out, marker::SOS);
    put_u16(&mut out, (6 + 2 * n) as u16);
    out.push(n as u8);
    for comp in 0..n {
        out.push(comp as u8);
        let dc = comp.min(tables.dc.len().saturating_sub(1)) as u8;
        let ac = comp.min(tables.ac.len().saturating_sub(1)) as u8;
        out.push((dc << 4) | ac);
    }
    // Baseline scan header: full frequency range, no successive approximation
    out.push(0x00); // Ss
    out.push(0x3F); // Se
    out.push(0x00); // Ah/Al

    out.extend_from_slice(body);
    put_u16(&mut out, marker::EOI);

    out
}
