//! Variable-width length/count encoding shared by chunk framing (§4.3.1)
//! and the `NumSamples` field of a Samples chunk (§4.3.3).
//!
//! The width is always the smallest of {1, 4, 8} bytes that can hold the
//! value: 1 byte only if `value < 256`, 4 bytes if it additionally fits in
//! `u32`, otherwise 8 bytes (spec.md §8 item 5).

use std::io::{self, Read, Write};

/// Width, in bytes, that [`write_varlen`] would choose for `value`.
pub fn width_for(value: u64) -> u8 {
    if value < 256 {
        1
    } else if value <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

/// Write the `[NumLengthBytes][value]` pair for `value`.
pub fn write_varlen(w: &mut impl Write, value: u64) -> io::Result<()> {
    match width_for(value) {
        1 => {
            w.write_all(&[1u8])?;
            w.write_all(&[value as u8])
        }
        4 => {
            w.write_all(&[4u8])?;
            w.write_all(&(value as u32).to_le_bytes())
        }
        _ => {
            w.write_all(&[8u8])?;
            w.write_all(&value.to_le_bytes())
        }
    }
}

/// Read a `[NumLengthBytes][value]` pair previously written by
/// [`write_varlen`].
pub fn read_varlen(r: &mut impl Read) -> io::Result<u64> {
    let mut width_buf = [0u8; 1];
    r.read_exact(&mut width_buf)?;
    match width_buf[0] {
        1 => {
            let mut buf = [0u8; 1];
            r.read_exact(&mut buf)?;
            Ok(buf[0] as u64)
        }
        4 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        8 => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid NumLengthBytes {other}"),
        )),
    }
}
