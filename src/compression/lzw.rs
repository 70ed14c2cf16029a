//! LZW decompression
//!
//! TIFF LZW uses variable-width codes from 9 to 12 bits with two reserved
//! codes (256 = clear, 257 = end of information). Modern files pack codes
//! MSB-first and switch code width one entry early ("early change"); a
//! legacy variant produced by pre-TIFF-5 software packs LSB-first with the
//! strict width rule. The bit order is sniffed from the first two compressed
//! bytes: a conforming stream starts with the clear code, which encodes as
//! `0x80 ..` MSB-first and `0x00 0x01` LSB-first.

use std::io::{self, Read};

/// Bit packing order of an LZW stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Modern TIFF streams: high bit first, early width change
    MsbFirst,
    /// Legacy streams: low bit first, strict width change
    LsbFirst,
}

const CLEAR_CODE: u16 = 256;
const EOI_CODE: u16 = 257;
const FIRST_FREE: usize = 258;
const MIN_WIDTH: u8 = 9;
const MAX_WIDTH: u8 = 12;
const TABLE_LIMIT: usize = 4096;

/// Streaming LZW decoder
pub struct LzwReader<R> {
    inner: R,
    order: Option<BitOrder>,
    acc: u32,
    acc_bits: u8,
    table: Vec<Vec<u8>>,
    next_code: usize,
    width: u8,
    prev: Option<u16>,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl<R: Read> LzwReader<R> {
    /// Create a decoder that sniffs the bit order from the stream
    pub fn new(inner: R) -> Self {
        Self::with_state(inner, None)
    }

    /// Create a decoder with a fixed bit order (no sniffing)
    pub fn with_order(inner: R, order: BitOrder) -> Self {
        Self::with_state(inner, Some(order))
    }

    fn with_state(inner: R, order: Option<BitOrder>) -> Self {
        let mut table = Vec::with_capacity(TABLE_LIMIT);
        for i in 0..256u16 {
            table.push(vec![i as u8]);
        }
        table.push(Vec::new()); // 256 = clear
        table.push(Vec::new()); // 257 = EOI

        LzwReader {
            inner,
            order,
            acc: 0,
            acc_bits: 0,
            table,
            next_code: FIRST_FREE,
            width: MIN_WIDTH,
            prev: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        }
    }

    /// The sniffed or configured bit order, once known
    pub fn bit_order(&self) -> Option<BitOrder> {
        self.order
    }

    fn early_change(&self) -> bool {
        self.order == Some(BitOrder::MsbFirst)
    }

    /// Largest dictionary fill before the current width no longer fits
    fn width_limit(&self) -> usize {
        (1usize << self.width) - usize::from(self.early_change())
    }

    fn reset_table(&mut self) {
        self.table.truncate(FIRST_FREE);
        self.next_code = FIRST_FREE;
        self.width = MIN_WIDTH;
        self.prev = None;
    }

    fn push_byte(&mut self, byte: u8) {
        match self.order.expect("bit order decided before filling") {
            BitOrder::MsbFirst => {
                self.acc = (self.acc << 8) | byte as u32;
            }
            BitOrder::LsbFirst => {
                self.acc |= (byte as u32) << self.acc_bits;
            }
        }
        self.acc_bits += 8;
    }

    /// Decide the bit order from the first two compressed bytes
    fn sniff_order(&mut self) -> io::Result<()> {
        let mut first = [0u8; 2];
        let mut got = 0;
        while got < 2 {
            let n = self.inner.read(&mut first[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }

        let order = if got == 2 && first[0] == 0x00 && first[1] & 0x01 == 0x01 {
            tracing::debug!("legacy LSB-first LZW stream detected");
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        self.order = Some(order);

        for &b in &first[..got] {
            self.push_byte(b);
        }
        if got < 2 {
            self.finished = true;
        }

        Ok(())
    }

    fn read_code(&mut self) -> io::Result<Option<u16>> {
        while self.acc_bits < self.width {
            let mut byte = [0u8; 1];
            if self.inner.read(&mut byte)? == 0 {
                // Truncated stream without an EOI code; surface what we have
                return Ok(None);
            }
            self.push_byte(byte[0]);
        }

        let mask = (1u32 << self.width) - 1;
        let code = match self.order.expect("bit order decided before reading") {
            BitOrder::MsbFirst => {
                let c = (self.acc >> (self.acc_bits - self.width)) & mask;
                self.acc_bits -= self.width;
                self.acc &= (1 << self.acc_bits) - 1;
                c
            }
            BitOrder::LsbFirst => {
                let c = self.acc & mask;
                self.acc >>= self.width;
                self.acc_bits -= self.width;
                c
            }
        };

        Ok(Some(code as u16))
    }

    fn add_entry(&mut self, entry: Vec<u8>) {
        if self.next_code >= TABLE_LIMIT {
            return;
        }
        self.table.push(entry);
        self.next_code += 1;
        if self.width < MAX_WIDTH && self.next_code >= self.width_limit() {
            self.width += 1;
        }
    }

    /// Decode one code into `pending`
    fn step(&mut self) -> io::Result<()> {
        if self.order.is_none() {
            self.sniff_order()?;
            if self.finished {
                return Ok(());
            }
        }

        let code = match self.read_code()? {
            Some(c) => c,
            None => {
                self.finished = true;
                return Ok(());
            }
        };

        if code == CLEAR_CODE {
            self.reset_table();
            return Ok(());
        }
        if code == EOI_CODE {
            self.finished = true;
            return Ok(());
        }

        match self.prev {
            None => {
                if code >= 256 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("LZW code {} before any dictionary entry", code),
                    ));
                }
                self.pending.extend_from_slice(&self.table[code as usize]);
            }
            Some(prev) => {
                let entry = if (code as usize) < self.next_code {
                    self.table[code as usize].clone()
                } else if code as usize == self.next_code {
                    // KwKwK: the entry being defined by this very code
                    let mut e = self.table[prev as usize].clone();
                    e.push(e[0]);
                    e
                } else {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("LZW code {} out of range (next {})", code, self.next_code),
                    ));
                };

                let mut new_entry = self.table[prev as usize].clone();
                new_entry.push(entry[0]);
                self.add_entry(new_entry);

                self.pending.extend_from_slice(&entry);
            }
        }

        self.prev = Some(code);
        Ok(())
    }
}

impl<R: Read> Read for LzwReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;

        while written < buf.len() {
            if self.pending_pos < self.pending.len() {
                let available = self.pending.len() - self.pending_pos;
                let n = available.min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }

            if self.finished {
                break;
            }

            self.pending.clear();
            self.pending_pos = 0;
            self.step()?;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    /// Bit packer matching the decoder's expectations
    struct CodeWriter {
        order: BitOrder,
        out: Vec<u8>,
        acc: u32,
        acc_bits: u8,
    }

    impl CodeWriter {
        fn new(order: BitOrder) -> Self {
            CodeWriter {
                order,
                out: Vec::new(),
                acc: 0,
                acc_bits: 0,
            }
        }

        fn put(&mut self, code: u16, width: u8) {
            match self.order {
                BitOrder::MsbFirst => {
                    self.acc = (self.acc << width) | code as u32;
                    self.acc_bits += width;
                    while self.acc_bits >= 8 {
                        self.out.push((self.acc >> (self.acc_bits - 8)) as u8);
                        self.acc_bits -= 8;
                        self.acc &= (1 << self.acc_bits) - 1;
                    }
                }
                BitOrder::LsbFirst => {
                    self.acc |= (code as u32) << self.acc_bits;
                    self.acc_bits += width;
                    while self.acc_bits >= 8 {
                        self.out.push(self.acc as u8);
                        self.acc >>= 8;
                        self.acc_bits -= 8;
                    }
                }
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.acc_bits > 0 {
                match self.order {
                    BitOrder::MsbFirst => self.out.push((self.acc << (8 - self.acc_bits)) as u8),
                    BitOrder::LsbFirst => self.out.push(self.acc as u8),
                }
            }
            self.out
        }
    }

    /// Reference encoder mirroring the decoder's width discipline
    fn lzw_encode(data: &[u8], order: BitOrder) -> Vec<u8> {
        let early = order == BitOrder::MsbFirst;
        let limit = |w: u8| (1usize << w) - usize::from(early);

        let mut writer = CodeWriter::new(order);
        let mut table: HashMap<Vec<u8>, u16> = HashMap::new();
        let mut next_code = FIRST_FREE;
        let mut width = MIN_WIDTH;

        writer.put(CLEAR_CODE, width);

        let code_of = |table: &HashMap<Vec<u8>, u16>, s: &[u8]| -> u16 {
            if s.len() == 1 {
                s[0] as u16
            } else {
                table[s]
            }
        };
        let contains = |table: &HashMap<Vec<u8>, u16>, s: &[u8]| -> bool {
            s.len() == 1 || table.contains_key(s)
        };

        let mut current: Vec<u8> = Vec::new();
        for &byte in data {
            let mut candidate = current.clone();
            candidate.push(byte);

            if contains(&table, &candidate) {
                current = candidate;
                continue;
            }

            writer.put(code_of(&table, &current), width);
            table.insert(candidate, next_code as u16);
            next_code += 1;
            // The decoder's counter lags ours by one at this point
            if width < MAX_WIDTH && next_code - 1 >= limit(width) {
                width += 1;
            }

            if next_code >= TABLE_LIMIT - 3 {
                writer.put(CLEAR_CODE, width);
                table.clear();
                next_code = FIRST_FREE;
                width = MIN_WIDTH;
            }

            current = vec![byte];
        }

        if !current.is_empty() {
            writer.put(code_of(&table, &current), width);
            if width < MAX_WIDTH && next_code >= limit(width) {
                width += 1;
            }
        }
        writer.put(EOI_CODE, width);
        writer.finish()
    }

    fn decode_all(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        LzwReader::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_known_code_sequence() {
        // The predicted gradient row [0,1,1,1,1,1,1,1] compresses to
        // CLEAR, 0, 1, 259, 260, EOI at nine bits each
        let mut w = CodeWriter::new(BitOrder::MsbFirst);
        for code in [256u16, 0, 1, 259, 260, 257] {
            w.put(code, 9);
        }
        assert_eq!(decode_all(&w.finish()), vec![0, 1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_sniffs_msb_stream() {
        let packed = lzw_encode(b"TOBEORNOTTOBEORTOBEORNOT", BitOrder::MsbFirst);
        assert_eq!(packed[0], 0x80); // clear code, MSB-first
        let mut reader = LzwReader::new(&packed[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"TOBEORNOTTOBEORTOBEORNOT");
        assert_eq!(reader.bit_order(), Some(BitOrder::MsbFirst));
    }

    #[test]
    fn test_sniffs_legacy_lsb_stream() {
        let packed = lzw_encode(b"TOBEORNOTTOBEORTOBEORNOT", BitOrder::LsbFirst);
        assert_eq!(packed[0], 0x00);
        assert_eq!(packed[1] & 0x01, 0x01);
        let mut reader = LzwReader::new(&packed[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"TOBEORNOTTOBEORTOBEORNOT");
        assert_eq!(reader.bit_order(), Some(BitOrder::LsbFirst));
    }

    #[test]
    fn test_repetitive_data() {
        let data = vec![65u8; 4000];
        let packed = lzw_encode(&data, BitOrder::MsbFirst);
        assert!(packed.len() < data.len());
        assert_eq!(decode_all(&packed), data);
    }

    #[test]
    fn test_width_growth_and_clear() {
        // Incompressible pattern forces the table through all code widths
        // and past a dictionary reset
        let data: Vec<u8> = (0..64 * 1024u32)
            .map(|i| (i * 7 + (i >> 3)) as u8)
            .collect();
        for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
            let packed = lzw_encode(&data, order);
            assert_eq!(decode_all(&packed), data, "order {:?}", order);
        }
    }

    #[test]
    fn test_truncated_stream_short_read() {
        let packed = lzw_encode(b"hello world hello world", BitOrder::MsbFirst);
        let cut = &packed[..packed.len() / 2];
        let mut out = Vec::new();
        LzwReader::new(cut).read_to_end(&mut out).unwrap();
        assert!(!out.is_empty());
        assert!(out.len() < 23);
        assert_eq!(&b"hello world hello world"[..out.len()], &out[..]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode_all(&[]), Vec::<u8>::new());
        let empty = lzw_encode(&[], BitOrder::MsbFirst);
        assert_eq!(decode_all(&empty), Vec::<u8>::new());
    }

    proptest! {
        #[test]
        fn roundtrip_msb(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let packed = lzw_encode(&data, BitOrder::MsbFirst);
            prop_assert_eq!(decode_all(&packed), data);
        }

        #[test]
        fn roundtrip_lsb(data in proptest::collection::vec(any::<u8>(), 1..4096)) {
            let packed = lzw_encode(&data, BitOrder::LsbFirst);
            let mut out = Vec::new();
            LzwReader::with_order(&packed[..], BitOrder::LsbFirst)
                .read_to_end(&mut out)
                .unwrap();
            prop_assert_eq!(out, data);
        }

        #[test]
        fn roundtrip_runs(byte in any::<u8>(), len in 1usize..8192) {
            let data = vec![byte; len];
            let packed = lzw_encode(&data, BitOrder::MsbFirst);
            prop_assert_eq!(decode_all(&packed), data);
        }
    }
}
