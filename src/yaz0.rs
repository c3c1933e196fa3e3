//! Yaz0 run-length compression.
//!
//! The stream is a 0x10 byte header (magic, decompressed size) followed by
//! groups of eight chunks behind one code byte. A set code bit is a literal
//! byte; a clear bit is a back-reference into the previous 0x1000 bytes of
//! output, 3 to 0x111 bytes long, in a two or three byte encoding.
use std::io::{Cursor, Write};

use binrw::{BinReaderExt, BinResult};
use log::debug;
use thiserror::Error;

const MAGIC: [u8; 4] = *b"Yaz0";

/// Furthest back a reference may reach.
const WINDOW: usize = 0x1000;
/// Longest match a three byte chunk can encode.
const MAX_MATCH: usize = 0x111;
const MIN_MATCH: usize = 3;
/// Longest match a two byte chunk can encode.
const SHORT_MAX_MATCH: usize = 0x11;

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("invalid Yaz0 magic {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("stream ended before {expected} decompressed bytes were produced")]
    UnexpectedEof { expected: u32 },

    #[error("back-reference past the start of the output")]
    InvalidBackReference,

    #[error("error reading stream header")]
    Binrw(#[from] binrw::Error),
}

/// Compresses `data` into a complete Yaz0 stream.
///
/// Matching is greedy: at each position the longest match within the window
/// wins, with literals for everything shorter than three bytes. Output is
/// deterministic for a given input.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(0x10 + data.len() / 2);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0u8; 8]);

    let mut pos = 0;
    while pos < data.len() {
        let code_index = out.len();
        out.push(0);
        let mut code = 0u8;

        for bit in (0..8).rev() {
            if pos >= data.len() {
                break;
            }
            match find_match(data, pos) {
                Some((distance, length)) => {
                    let dist = (distance - 1) as u16;
                    if length <= SHORT_MAX_MATCH {
                        // NR RR: high nibble is length - 2.
                        out.push((((length - 2) as u8) << 4) | (dist >> 8) as u8);
                        out.push(dist as u8);
                    } else {
                        // 0R RR NN: separate length byte, biased by 0x12.
                        out.push((dist >> 8) as u8);
                        out.push(dist as u8);
                        out.push((length - 0x12) as u8);
                    }
                    pos += length;
                }
                None => {
                    code |= 1 << bit;
                    out.push(data[pos]);
                    pos += 1;
                }
            }
        }

        out[code_index] = code;
    }

    debug!("yaz0: {} -> {} bytes", data.len(), out.len());
    out
}

/// Longest match for `data[pos..]` within the window, as
/// `(distance, length)`. [None] when no match reaches the minimum length.
fn find_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let window_start = pos.saturating_sub(WINDOW);
    let max_length = MAX_MATCH.min(data.len() - pos);
    if max_length < MIN_MATCH {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    for start in window_start..pos {
        let mut length = 0;
        // References may overlap their own output, so the source range can
        // run past `pos`.
        while length < max_length && data[start + length] == data[pos + length] {
            length += 1;
        }
        if length >= MIN_MATCH && best.map_or(true, |(_, l)| length > l) {
            best = Some((pos - start, length));
            if length == max_length {
                break;
            }
        }
    }
    best
}

/// Decompresses a complete Yaz0 stream.
pub fn decompress(stream: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let mut reader = Cursor::new(stream);
    let magic = reader.read_be::<[u8; 4]>()?;
    if magic != MAGIC {
        return Err(DecompressError::InvalidMagic(magic));
    }
    let size = reader.read_be::<u32>()?;
    let body = stream
        .get(0x10..)
        .ok_or(DecompressError::UnexpectedEof { expected: size })?;

    let mut out = Vec::with_capacity(size as usize);
    let mut pos = 0;
    while out.len() < size as usize {
        let code = *body.get(pos).ok_or(DecompressError::UnexpectedEof { expected: size })?;
        pos += 1;

        for bit in (0..8).rev() {
            if out.len() >= size as usize {
                break;
            }
            if code & (1 << bit) != 0 {
                let byte =
                    *body.get(pos).ok_or(DecompressError::UnexpectedEof { expected: size })?;
                out.push(byte);
                pos += 1;
            } else {
                let chunk: &[u8] = body
                    .get(pos..pos + 2)
                    .ok_or(DecompressError::UnexpectedEof { expected: size })?;
                pos += 2;
                let distance = ((((chunk[0] & 0x0F) as usize) << 8) | chunk[1] as usize) + 1;
                let length = match chunk[0] >> 4 {
                    0 => {
                        let extra = *body
                            .get(pos)
                            .ok_or(DecompressError::UnexpectedEof { expected: size })?;
                        pos += 1;
                        extra as usize + 0x12
                    }
                    n => n as usize + 2,
                };

                if distance > out.len() {
                    return Err(DecompressError::InvalidBackReference);
                }
                for _ in 0..length {
                    out.push(out[out.len() - distance]);
                }
            }
        }
    }

    Ok(out)
}

/// Writes a compressed copy of `data` to `writer`.
pub fn write_compressed<W: Write>(writer: &mut W, data: &[u8]) -> BinResult<()> {
    writer.write_all(&compress(data)).map_err(binrw::Error::Io)
}
