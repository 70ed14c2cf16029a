//! TIFF Image File Directory (IFD) handling
//!
//! An IFD is an ordered list of tagged, typed entries describing one image.
//! The directories of a file form a chain (IFD0, IFD1, ...) terminated by a
//! zero next-IFD offset; entries may point at nested sub-IFD chains (EXIF,
//! GPS). [`CompoundDirectory`] materializes the whole tree in one pass.

use crate::error::{Result, TiffError};
use crate::tags::{data_type, is_sub_ifd_pointer, tag_name};
use crate::{BIGTIFF_VERSION, TIFF_MAGIC_BE, TIFF_MAGIC_LE, TIFF_VERSION};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

/// Byte order declared by the file header, latched for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// "II" - Intel byte order
    Little,
    /// "MM" - Motorola byte order
    Big,
}

/// IFD entry value
#[derive(Debug, Clone, PartialEq)]
pub enum IfdValue {
    /// Byte values
    Bytes(Vec<u8>),
    /// ASCII string
    Ascii(String),
    /// Short (u16) values
    Shorts(Vec<u16>),
    /// Long (u32) values
    Longs(Vec<u32>),
    /// Rational (numerator/denominator) values
    Rationals(Vec<(u32, u32)>),
    /// Signed byte values
    SBytes(Vec<i8>),
    /// Undefined bytes
    Undefined(Vec<u8>),
    /// Signed short values
    SShorts(Vec<i16>),
    /// Signed long values
    SLongs(Vec<i32>),
    /// Signed rational values
    SRationals(Vec<(i32, i32)>),
    /// Float values
    Floats(Vec<f32>),
    /// Double values
    Doubles(Vec<f64>),
    /// Long8 (u64) values (BigTIFF value type; may appear in classic files)
    Long8s(Vec<u64>),
    /// Parsed nested IFD chain (EXIF, GPS, SubIFDs)
    Ifds(Vec<Ifd>),
}

impl IfdValue {
    /// Get as single u16 value
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            IfdValue::Bytes(v) if !v.is_empty() => Some(v[0] as u16),
            IfdValue::Shorts(v) if !v.is_empty() => Some(v[0]),
            IfdValue::Longs(v) if !v.is_empty() => Some(v[0] as u16),
            _ => None,
        }
    }

    /// Get as single u32 value
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            IfdValue::Bytes(v) if !v.is_empty() => Some(v[0] as u32),
            IfdValue::Shorts(v) if !v.is_empty() => Some(v[0] as u32),
            IfdValue::Longs(v) if !v.is_empty() => Some(v[0]),
            _ => None,
        }
    }

    /// Get as vector of u16 values
    pub fn as_u16_vec(&self) -> Option<Vec<u16>> {
        match self {
            IfdValue::Bytes(v) => Some(v.iter().map(|&b| b as u16).collect()),
            IfdValue::Shorts(v) => Some(v.clone()),
            IfdValue::Longs(v) => Some(v.iter().map(|&l| l as u16).collect()),
            _ => None,
        }
    }

    /// Get as vector of u32 values
    pub fn as_u32_vec(&self) -> Option<Vec<u32>> {
        match self {
            IfdValue::Bytes(v) => Some(v.iter().map(|&b| b as u32).collect()),
            IfdValue::Shorts(v) => Some(v.iter().map(|&s| s as u32).collect()),
            IfdValue::Longs(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Widening accessor: any unsigned integer shape as u64 values
    pub fn as_long_array(&self) -> Option<Vec<u64>> {
        match self {
            IfdValue::Bytes(v) => Some(v.iter().map(|&b| b as u64).collect()),
            IfdValue::Shorts(v) => Some(v.iter().map(|&s| s as u64).collect()),
            IfdValue::Longs(v) => Some(v.iter().map(|&l| l as u64).collect()),
            IfdValue::Long8s(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            IfdValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Get as rational (f64)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IfdValue::Rationals(v) if !v.is_empty() => {
                let (n, d) = v[0];
                if d == 0 {
                    None
                } else {
                    Some(n as f64 / d as f64)
                }
            }
            IfdValue::SRationals(v) if !v.is_empty() => {
                let (n, d) = v[0];
                if d == 0 {
                    None
                } else {
                    Some(n as f64 / d as f64)
                }
            }
            IfdValue::Floats(v) if !v.is_empty() => Some(v[0] as f64),
            IfdValue::Doubles(v) if !v.is_empty() => Some(v[0]),
            _ => None,
        }
    }

    /// Get as unsigned rational pairs
    pub fn as_rationals(&self) -> Option<&[(u32, u32)]> {
        match self {
            IfdValue::Rationals(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            IfdValue::Bytes(v) => Some(v),
            IfdValue::Undefined(v) => Some(v),
            _ => None,
        }
    }

    /// Get parsed sub-IFDs
    pub fn as_ifds(&self) -> Option<&[Ifd]> {
        match self {
            IfdValue::Ifds(v) => Some(v),
            _ => None,
        }
    }

    /// Get data type ID
    pub fn type_id(&self) -> u16 {
        match self {
            IfdValue::Bytes(_) => data_type::BYTE,
            IfdValue::Ascii(_) => data_type::ASCII,
            IfdValue::Shorts(_) => data_type::SHORT,
            IfdValue::Longs(_) | IfdValue::Ifds(_) => data_type::LONG,
            IfdValue::Rationals(_) => data_type::RATIONAL,
            IfdValue::SBytes(_) => data_type::SBYTE,
            IfdValue::Undefined(_) => data_type::UNDEFINED,
            IfdValue::SShorts(_) => data_type::SSHORT,
            IfdValue::SLongs(_) => data_type::SLONG,
            IfdValue::SRationals(_) => data_type::SRATIONAL,
            IfdValue::Floats(_) => data_type::FLOAT,
            IfdValue::Doubles(_) => data_type::DOUBLE,
            IfdValue::Long8s(_) => data_type::LONG8,
        }
    }

    /// Get count of values
    pub fn count(&self) -> u32 {
        match self {
            IfdValue::Bytes(v) => v.len() as u32,
            IfdValue::Ascii(s) => (s.len() + 1) as u32, // Include null terminator
            IfdValue::Shorts(v) => v.len() as u32,
            IfdValue::Longs(v) => v.len() as u32,
            IfdValue::Rationals(v) => v.len() as u32,
            IfdValue::SBytes(v) => v.len() as u32,
            IfdValue::Undefined(v) => v.len() as u32,
            IfdValue::SShorts(v) => v.len() as u32,
            IfdValue::SLongs(v) => v.len() as u32,
            IfdValue::SRationals(v) => v.len() as u32,
            IfdValue::Floats(v) => v.len() as u32,
            IfdValue::Doubles(v) => v.len() as u32,
            IfdValue::Long8s(v) => v.len() as u32,
            IfdValue::Ifds(v) => v.len() as u32,
        }
    }
}

/// IFD entry
#[derive(Debug, Clone, PartialEq)]
pub struct IfdEntry {
    /// Tag ID
    pub tag: u16,
    /// Value
    pub value: IfdValue,
}

impl IfdEntry {
    /// Create new entry
    pub fn new(tag: u16, value: IfdValue) -> Self {
        IfdEntry { tag, value }
    }

    /// Create short entry
    pub fn short(tag: u16, value: u16) -> Self {
        IfdEntry {
            tag,
            value: IfdValue::Shorts(vec![value]),
        }
    }

    /// Create long entry
    pub fn long(tag: u16, value: u32) -> Self {
        IfdEntry {
            tag,
            value: IfdValue::Longs(vec![value]),
        }
    }

    /// Create ASCII entry
    pub fn ascii(tag: u16, value: &str) -> Self {
        IfdEntry {
            tag,
            value: IfdValue::Ascii(value.to_string()),
        }
    }
}

/// Image File Directory
///
/// Entries keep file order; lookup is by tag. A conforming file never
/// repeats a tag within one directory, so duplicates keep the first
/// occurrence and are reported as a warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ifd {
    entries: Vec<IfdEntry>,
    index: BTreeMap<u16, usize>,
    /// Offset to next IFD (0 if none)
    pub next_ifd_offset: u32,
}

impl Ifd {
    /// Create new empty IFD
    pub fn new() -> Self {
        Ifd::default()
    }

    /// Add entry; returns false (and keeps the existing entry) on a
    /// duplicate tag
    pub fn add(&mut self, entry: IfdEntry) -> bool {
        if self.index.contains_key(&entry.tag) {
            return false;
        }
        self.index.insert(entry.tag, self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Get entry by tag
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.index.get(&tag).map(|&i| &self.entries[i])
    }

    /// Get value by tag
    pub fn get_value(&self, tag: u16) -> Option<&IfdValue> {
        self.get(tag).map(|e| &e.value)
    }

    /// Get required u32 value
    pub fn get_required_u32(&self, tag: u16) -> Result<u32> {
        self.get_value(tag)
            .and_then(|v| v.as_u32())
            .ok_or_else(|| TiffError::MissingTag(tag_name(tag).to_string()))
    }

    /// Get optional u32 value with default
    pub fn get_u32_or(&self, tag: u16, default: u32) -> u32 {
        self.get_value(tag)
            .and_then(|v| v.as_u32())
            .unwrap_or(default)
    }

    /// Get required u16 value
    pub fn get_required_u16(&self, tag: u16) -> Result<u16> {
        self.get_value(tag)
            .and_then(|v| v.as_u16())
            .ok_or_else(|| TiffError::MissingTag(tag_name(tag).to_string()))
    }

    /// Get optional u16 value with default
    pub fn get_u16_or(&self, tag: u16, default: u16) -> u16 {
        self.get_value(tag)
            .and_then(|v| v.as_u16())
            .unwrap_or(default)
    }

    /// Get a tag as a widened u64 array; `Err(MissingTag)` when required
    pub fn get_long_array(&self, tag: u16, required: bool) -> Result<Option<Vec<u64>>> {
        match self.get_value(tag) {
            Some(v) => v
                .as_long_array()
                .map(Some)
                .ok_or_else(|| {
                    TiffError::InconsistentMetadata(format!(
                        "{} has non-integer type {}",
                        tag_name(tag),
                        data_type::name(v.type_id())
                    ))
                }),
            None if required => Err(TiffError::MissingTag(tag_name(tag).to_string())),
            None => Ok(None),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in file order
    pub fn entries(&self) -> impl Iterator<Item = &IfdEntry> {
        self.entries.iter()
    }

    /// Read IFD from reader
    pub fn read<R: Read + Seek, B: ByteOrder>(
        reader: &mut R,
        offset: u32,
        warn: &mut dyn FnMut(String),
    ) -> Result<Self> {
        reader.seek(SeekFrom::Start(offset as u64))?;

        let num_entries = reader.read_u16::<B>()?;
        let mut ifd = Ifd::new();

        for _ in 0..num_entries {
            if let Some(entry) = Self::read_entry::<R, B>(reader, warn)? {
                if !ifd.add(entry.clone()) {
                    warn(format!(
                        "Duplicate TIFF tag {} ({}), keeping first occurrence",
                        entry.tag,
                        tag_name(entry.tag)
                    ));
                }
            }
        }

        ifd.next_ifd_offset = reader.read_u32::<B>()?;

        Ok(ifd)
    }

    /// Read single entry; `None` for entries with unknown value types
    fn read_entry<R: Read + Seek, B: ByteOrder>(
        reader: &mut R,
        warn: &mut dyn FnMut(String),
    ) -> Result<Option<IfdEntry>> {
        let tag = reader.read_u16::<B>()?;
        let type_id = reader.read_u16::<B>()?;
        let count = reader.read_u32::<B>()?;

        // Read value/offset field (4 bytes)
        let mut value_bytes = [0u8; 4];
        reader.read_exact(&mut value_bytes)?;

        let type_size = data_type::size(type_id);
        if type_size == 0 {
            warn(format!(
                "Unknown TIFF value type {} for tag {} ({}), entry skipped",
                type_id,
                tag,
                tag_name(tag)
            ));
            return Ok(None);
        }

        let total_size = type_size * count as usize;

        let value = if total_size <= 4 {
            // Value fits in the 4-byte field
            Self::parse_value::<B>(type_id, count, &value_bytes)
        } else {
            // Value is at an offset
            let offset = B::read_u32(&value_bytes);

            let current_pos = reader.stream_position()?;
            reader.seek(SeekFrom::Start(offset as u64))?;

            let mut data = vec![0u8; total_size];
            reader.read_exact(&mut data)?;

            reader.seek(SeekFrom::Start(current_pos))?;

            Self::parse_value::<B>(type_id, count, &data)
        };

        Ok(Some(IfdEntry { tag, value }))
    }

    /// Parse value from bytes
    fn parse_value<B: ByteOrder>(type_id: u16, count: u32, data: &[u8]) -> IfdValue {
        let count = (count as usize).min(data.len() / data_type::size(type_id).max(1));

        match type_id {
            data_type::BYTE => IfdValue::Bytes(data[..count].to_vec()),
            data_type::ASCII => {
                let s = String::from_utf8_lossy(&data[..count]);
                IfdValue::Ascii(s.trim_end_matches('\0').to_string())
            }
            data_type::SHORT => {
                IfdValue::Shorts((0..count).map(|i| B::read_u16(&data[i * 2..])).collect())
            }
            data_type::LONG => {
                IfdValue::Longs((0..count).map(|i| B::read_u32(&data[i * 4..])).collect())
            }
            data_type::RATIONAL => IfdValue::Rationals(
                (0..count)
                    .map(|i| (B::read_u32(&data[i * 8..]), B::read_u32(&data[i * 8 + 4..])))
                    .collect(),
            ),
            data_type::SBYTE => {
                IfdValue::SBytes(data[..count].iter().map(|&b| b as i8).collect())
            }
            data_type::UNDEFINED => IfdValue::Undefined(data[..count].to_vec()),
            data_type::SSHORT => {
                IfdValue::SShorts((0..count).map(|i| B::read_i16(&data[i * 2..])).collect())
            }
            data_type::SLONG => {
                IfdValue::SLongs((0..count).map(|i| B::read_i32(&data[i * 4..])).collect())
            }
            data_type::SRATIONAL => IfdValue::SRationals(
                (0..count)
                    .map(|i| (B::read_i32(&data[i * 8..]), B::read_i32(&data[i * 8 + 4..])))
                    .collect(),
            ),
            data_type::FLOAT => {
                IfdValue::Floats((0..count).map(|i| B::read_f32(&data[i * 4..])).collect())
            }
            data_type::DOUBLE => {
                IfdValue::Doubles((0..count).map(|i| B::read_f64(&data[i * 8..])).collect())
            }
            data_type::LONG8 | data_type::SLONG8 | data_type::IFD8 => {
                IfdValue::Long8s((0..count).map(|i| B::read_u64(&data[i * 8..])).collect())
            }
            // read_entry filters unknown types before we get here
            _ => IfdValue::Undefined(data[..count].to_vec()),
        }
    }
}

/// The flattened top-level IFD chain of one file, with nested sub-IFDs
/// preserved inside entry values
#[derive(Debug, Clone, Default)]
pub struct CompoundDirectory {
    directories: Vec<Ifd>,
}

/// Sub-IFD chains nested deeper than this are not followed
const MAX_IFD_DEPTH: u32 = 8;

impl CompoundDirectory {
    /// Parse the TIFF header and walk the whole IFD chain.
    ///
    /// Returns the directory tree and the byte order the header declared;
    /// the caller latches the byte order for all later pixel reads.
    pub fn read<R: Read + Seek>(
        reader: &mut R,
        warn: &mut dyn FnMut(String),
    ) -> Result<(Self, Endian)> {
        reader.seek(SeekFrom::Start(0))?;

        let mut bom = [0u8; 2];
        reader.read_exact(&mut bom)?;

        let endian = match bom {
            TIFF_MAGIC_LE => Endian::Little,
            TIFF_MAGIC_BE => Endian::Big,
            other => return Err(TiffError::InvalidByteOrder(other)),
        };

        let compound = match endian {
            Endian::Little => Self::read_endian::<R, LittleEndian>(reader, warn)?,
            Endian::Big => Self::read_endian::<R, BigEndian>(reader, warn)?,
        };

        Ok((compound, endian))
    }

    fn read_endian<R: Read + Seek, B: ByteOrder>(
        reader: &mut R,
        warn: &mut dyn FnMut(String),
    ) -> Result<Self> {
        let version = reader.read_u16::<B>()?;
        if version == BIGTIFF_VERSION {
            return Err(TiffError::UnsupportedVersion { version });
        }
        if version != TIFF_VERSION {
            return Err(TiffError::InvalidMagic);
        }

        let ifd0_offset = reader.read_u32::<B>()?;

        let mut visited = HashSet::new();
        let directories =
            Self::read_chain::<R, B>(reader, ifd0_offset, &mut visited, 0, warn)?;

        Ok(CompoundDirectory { directories })
    }

    /// Walk one IFD chain, recursing into sub-IFD pointer tags.
    /// `visited` spans the whole file so cross-linked chains are caught.
    fn read_chain<R: Read + Seek, B: ByteOrder>(
        reader: &mut R,
        start_offset: u32,
        visited: &mut HashSet<u32>,
        depth: u32,
        warn: &mut dyn FnMut(String),
    ) -> Result<Vec<Ifd>> {
        let mut directories = Vec::new();
        let mut offset = start_offset;

        while offset != 0 {
            if !visited.insert(offset) {
                return Err(TiffError::CyclicIfd {
                    offset: offset as u64,
                });
            }

            let mut ifd = Ifd::read::<R, B>(reader, offset, warn)?;
            Self::resolve_sub_ifds::<R, B>(reader, &mut ifd, visited, depth, warn)?;

            offset = ifd.next_ifd_offset;
            directories.push(ifd);
        }

        Ok(directories)
    }

    /// Replace sub-IFD pointer values with their parsed directories
    fn resolve_sub_ifds<R: Read + Seek, B: ByteOrder>(
        reader: &mut R,
        ifd: &mut Ifd,
        visited: &mut HashSet<u32>,
        depth: u32,
        warn: &mut dyn FnMut(String),
    ) -> Result<()> {
        for i in 0..ifd.entries.len() {
            if !is_sub_ifd_pointer(ifd.entries[i].tag) {
                continue;
            }

            let pointers = match ifd.entries[i].value.as_u32_vec() {
                Some(p) => p,
                None => continue,
            };

            if depth >= MAX_IFD_DEPTH {
                warn(format!(
                    "Sub-IFD nesting deeper than {} at tag {}, not followed",
                    MAX_IFD_DEPTH,
                    tag_name(ifd.entries[i].tag)
                ));
                continue;
            }

            let mut sub_dirs = Vec::new();
            for pointer in pointers {
                let mut chain =
                    Self::read_chain::<R, B>(reader, pointer, visited, depth + 1, warn)?;
                sub_dirs.append(&mut chain);
            }

            ifd.entries[i].value = IfdValue::Ifds(sub_dirs);
        }

        Ok(())
    }

    /// Number of top-level directories (images)
    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// Get a top-level directory by index
    pub fn directory(&self, index: usize) -> Option<&Ifd> {
        self.directories.get(index)
    }

    /// First entry with this tag across the top-level chain
    pub fn entry_by_tag(&self, tag: u16) -> Option<&IfdEntry> {
        self.directories.iter().find_map(|d| d.get(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::tag;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn no_warn() -> impl FnMut(String) {
        |_| {}
    }

    #[test]
    fn test_ifd_entry_short() {
        let entry = IfdEntry::short(tag::IMAGE_WIDTH, 1920);
        assert_eq!(entry.tag, tag::IMAGE_WIDTH);
        assert_eq!(entry.value.as_u16(), Some(1920));
    }

    #[test]
    fn test_ifd_entry_long() {
        let entry = IfdEntry::long(tag::IMAGE_LENGTH, 1080);
        assert_eq!(entry.tag, tag::IMAGE_LENGTH);
        assert_eq!(entry.value.as_u32(), Some(1080));
    }

    #[test]
    fn test_ifd_add_get() {
        let mut ifd = Ifd::new();
        ifd.add(IfdEntry::short(tag::IMAGE_WIDTH, 640));
        ifd.add(IfdEntry::short(tag::IMAGE_LENGTH, 480));

        assert_eq!(ifd.len(), 2);
        assert_eq!(ifd.get_required_u32(tag::IMAGE_WIDTH).unwrap(), 640);
        assert_eq!(ifd.get_required_u32(tag::IMAGE_LENGTH).unwrap(), 480);
    }

    #[test]
    fn test_ifd_duplicate_keeps_first() {
        let mut ifd = Ifd::new();
        assert!(ifd.add(IfdEntry::short(tag::COMPRESSION, 1)));
        assert!(!ifd.add(IfdEntry::short(tag::COMPRESSION, 5)));
        assert_eq!(ifd.get_required_u16(tag::COMPRESSION).unwrap(), 1);
        assert_eq!(ifd.len(), 1);
    }

    #[test]
    fn test_ifd_preserves_file_order() {
        let mut ifd = Ifd::new();
        ifd.add(IfdEntry::short(tag::COMPRESSION, 1));
        ifd.add(IfdEntry::short(tag::IMAGE_WIDTH, 16));

        let tags: Vec<u16> = ifd.entries().map(|e| e.tag).collect();
        assert_eq!(tags, vec![tag::COMPRESSION, tag::IMAGE_WIDTH]);
    }

    #[test]
    fn test_as_long_array_widens() {
        assert_eq!(
            IfdValue::Shorts(vec![1, 2]).as_long_array(),
            Some(vec![1, 2])
        );
        assert_eq!(
            IfdValue::Longs(vec![70_000]).as_long_array(),
            Some(vec![70_000])
        );
        assert_eq!(
            IfdValue::Bytes(vec![0xFF]).as_long_array(),
            Some(vec![255])
        );
        assert_eq!(
            IfdValue::Long8s(vec![u64::MAX]).as_long_array(),
            Some(vec![u64::MAX])
        );
        assert_eq!(IfdValue::Ascii("x".into()).as_long_array(), None);
    }

    #[test]
    fn test_ascii_trims_nul() {
        let v = Ifd::parse_value::<LittleEndian>(data_type::ASCII, 4, b"abc\0");
        assert_eq!(v.as_string(), Some("abc"));
    }

    #[test]
    fn test_rational_as_f64() {
        let v = IfdValue::Rationals(vec![(299, 1000)]);
        assert_eq!(v.as_f64(), Some(0.299));
        let zero_den = IfdValue::Rationals(vec![(1, 0)]);
        assert_eq!(zero_den.as_f64(), None);
    }

    /// Minimal LE file: header + one IFD with a single inline SHORT entry
    fn single_entry_file(next_offset: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TIFF_MAGIC_LE);
        buf.write_u16::<LittleEndian>(TIFF_VERSION).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap(); // IFD0 at 8
        buf.write_u16::<LittleEndian>(1).unwrap(); // entry count
        buf.write_u16::<LittleEndian>(tag::IMAGE_WIDTH).unwrap();
        buf.write_u16::<LittleEndian>(data_type::SHORT).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(640).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // inline padding
        buf.write_u32::<LittleEndian>(next_offset).unwrap();
        buf
    }

    #[test]
    fn test_read_single_ifd() {
        let data = single_entry_file(0);
        let mut warn = no_warn();
        let (compound, endian) =
            CompoundDirectory::read(&mut Cursor::new(&data), &mut warn).unwrap();

        assert_eq!(endian, Endian::Little);
        assert_eq!(compound.directory_count(), 1);
        let ifd = compound.directory(0).unwrap();
        assert_eq!(ifd.get_required_u32(tag::IMAGE_WIDTH).unwrap(), 640);
    }

    #[test]
    fn test_cyclic_chain_detected() {
        // Next-IFD offset points back at IFD0
        let data = single_entry_file(8);
        let mut warn = no_warn();
        let err = CompoundDirectory::read(&mut Cursor::new(&data), &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::CyclicIfd { offset: 8 }));
    }

    #[test]
    fn test_bigtiff_rejected() {
        let mut data = single_entry_file(0);
        data[2] = 43; // LE version field
        let mut warn = no_warn();
        let err = CompoundDirectory::read(&mut Cursor::new(&data), &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::UnsupportedVersion { version: 43 }));
    }

    #[test]
    fn test_bad_byte_order() {
        let data = [0x00u8, 0x2A, 0x00, 0x2A, 0, 0, 0, 0];
        let mut warn = no_warn();
        let err = CompoundDirectory::read(&mut Cursor::new(&data), &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::InvalidByteOrder(_)));
    }

    #[test]
    fn test_unknown_type_skipped_with_warning() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TIFF_MAGIC_LE);
        buf.write_u16::<LittleEndian>(TIFF_VERSION).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap();
        buf.write_u16::<LittleEndian>(2).unwrap();
        // Unknown value type 99
        buf.write_u16::<LittleEndian>(0x9999).unwrap();
        buf.write_u16::<LittleEndian>(99).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        // Known entry after it still parses
        buf.write_u16::<LittleEndian>(tag::IMAGE_WIDTH).unwrap();
        buf.write_u16::<LittleEndian>(data_type::SHORT).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(320).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();

        let mut warnings = Vec::new();
        let (compound, _) = CompoundDirectory::read(&mut Cursor::new(&buf), &mut |w| {
            warnings.push(w)
        })
        .unwrap();

        let ifd = compound.directory(0).unwrap();
        assert_eq!(ifd.len(), 1);
        assert_eq!(ifd.get_required_u32(tag::IMAGE_WIDTH).unwrap(), 320);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Unknown TIFF value type"));
    }

    #[test]
    fn test_exif_sub_ifd_parsed_into_value() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TIFF_MAGIC_LE);
        buf.write_u16::<LittleEndian>(TIFF_VERSION).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap();
        // IFD0: one entry pointing at the EXIF IFD at offset 26
        buf.write_u16::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(tag::EXIF_IFD).unwrap();
        buf.write_u16::<LittleEndian>(data_type::LONG).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u32::<LittleEndian>(26).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        // EXIF IFD at 26: a single short entry
        buf.write_u16::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(0x8827).unwrap(); // ISOSpeedRatings
        buf.write_u16::<LittleEndian>(data_type::SHORT).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(400).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();

        let mut warn = no_warn();
        let (compound, _) =
            CompoundDirectory::read(&mut Cursor::new(&buf), &mut warn).unwrap();

        assert_eq!(compound.directory_count(), 1);
        let exif = compound
            .directory(0)
            .unwrap()
            .get_value(tag::EXIF_IFD)
            .unwrap()
            .as_ifds()
            .expect("pointer replaced by parsed directories");
        assert_eq!(exif.len(), 1);
        assert_eq!(exif[0].get_required_u16(0x8827).unwrap(), 400);
    }

    #[test]
    fn test_cyclic_sub_ifd_detected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TIFF_MAGIC_LE);
        buf.write_u16::<LittleEndian>(TIFF_VERSION).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap();
        // IFD0 at 8 whose EXIF pointer loops back to IFD0 itself
        buf.write_u16::<LittleEndian>(1).unwrap();
        buf.write_u16::<LittleEndian>(tag::EXIF_IFD).unwrap();
        buf.write_u16::<LittleEndian>(data_type::LONG).unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_u32::<LittleEndian>(8).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();

        let mut warn = no_warn();
        let err = CompoundDirectory::read(&mut Cursor::new(&buf), &mut warn).unwrap_err();
        assert!(matches!(err, TiffError::CyclicIfd { offset: 8 }));
    }

    #[test]
    fn test_big_endian_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TIFF_MAGIC_BE);
        buf.write_u16::<BigEndian>(TIFF_VERSION).unwrap();
        buf.write_u32::<BigEndian>(8).unwrap();
        buf.write_u16::<BigEndian>(1).unwrap();
        buf.write_u16::<BigEndian>(tag::IMAGE_LENGTH).unwrap();
        buf.write_u16::<BigEndian>(data_type::LONG).unwrap();
        buf.write_u32::<BigEndian>(1).unwrap();
        buf.write_u32::<BigEndian>(4176).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();

        let mut warn = no_warn();
        let (compound, endian) =
            CompoundDirectory::read(&mut Cursor::new(&buf), &mut warn).unwrap();
        assert_eq!(endian, Endian::Big);
        assert_eq!(
            compound
                .directory(0)
                .unwrap()
                .get_required_u32(tag::IMAGE_LENGTH)
                .unwrap(),
            4176
        );
    }
}
