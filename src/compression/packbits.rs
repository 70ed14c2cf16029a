//! PackBits run-length decompression
//!
//! Apple PackBits as adopted by TIFF 6.0: a header byte `n` announces either
//! `n + 1` literal bytes (`0..=127`), a run of `-n + 1` copies of the next
//! byte (`-127..=-1`), or nothing (`-128`). A bounded input that ends
//! mid-run yields a short read, not an error; the row reader above decides
//! whether the shortfall matters.

use std::io::{self, Read};

#[derive(Clone, Copy)]
enum State {
    Header,
    Literal(usize),
    Run(usize, u8),
    Done,
}

/// Streaming PackBits decoder
pub struct PackBitsReader<R> {
    inner: R,
    state: State,
}

impl<R: Read> PackBitsReader<R> {
    /// Create a decoder over a compressed stream
    pub fn new(inner: R) -> Self {
        PackBitsReader {
            inner,
            state: State::Header,
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Read for PackBitsReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;

        while written < buf.len() {
            match self.state {
                State::Done => break,
                State::Header => {
                    let header = match self.read_byte()? {
                        Some(b) => b as i8,
                        None => {
                            self.state = State::Done;
                            break;
                        }
                    };

                    if header >= 0 {
                        self.state = State::Literal(header as usize + 1);
                    } else if header != -128 {
                        let value = match self.read_byte()? {
                            Some(b) => b,
                            None => {
                                // Input ended between header and run byte
                                self.state = State::Done;
                                break;
                            }
                        };
                        self.state = State::Run((-(header as isize)) as usize + 1, value);
                    }
                    // header == -128 is a no-op
                }
                State::Literal(remaining) => {
                    let want = remaining.min(buf.len() - written);
                    let n = self.inner.read(&mut buf[written..written + want])?;
                    if n == 0 {
                        // Literal run truncated by the bounded input
                        self.state = State::Done;
                        break;
                    }
                    written += n;
                    self.state = if remaining == n {
                        State::Header
                    } else {
                        State::Literal(remaining - n)
                    };
                }
                State::Run(remaining, value) => {
                    let n = remaining.min(buf.len() - written);
                    buf[written..written + n].fill(value);
                    written += n;
                    self.state = if remaining == n {
                        State::Header
                    } else {
                        State::Run(remaining - n, value)
                    };
                }
            }
        }

        Ok(written)
    }
}
