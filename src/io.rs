//! Binary BWT file format.
//!
//! Little-endian layout: a 30-byte header (magic `0xCACA`, string count,
//! symbol count, run count, payload flag) followed by `num_runs` packed
//! run bytes. A non-zero flag announces an FM-index payload after the
//! runs; this implementation rebuilds the index from the runs instead and
//! never reads or writes that payload.

use std::io::{Read, Write};

use thiserror::Error;

use crate::rle::{RleString, RleUnit};

/// Magic number opening every BWT file.
pub const BWT_MAGIC: u16 = 0xCACA;

/// Header flag: no FM-index payload follows the runs.
pub const FLAG_NO_FM_PAYLOAD: u32 = 0;
/// Header flag: an FM-index payload follows the runs (skipped on read).
pub const FLAG_HAS_FM_PAYLOAD: u32 = 1;

const HEADER_LEN: usize = 30;

/// Errors raised while decoding or encoding the binary format.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file does not start with [`BWT_MAGIC`].
    #[error("bad magic number {found:#06x}, expected 0xcaca")]
    BadMagic {
        /// Magic number actually present.
        found: u16,
    },

    /// Fewer run bytes than the header declares.
    #[error("run data truncated: header declares {declared} runs, {available} available")]
    TruncatedRuns {
        /// Run count declared by the header.
        declared: u64,
        /// Run bytes actually present.
        available: u64,
    },

    /// The run lengths do not sum to the declared symbol count.
    #[error("header declares {declared} symbols but the runs encode {actual}")]
    InconsistentSymbolCount {
        /// Symbol count declared by the header.
        declared: u64,
        /// Sum of the run lengths.
        actual: u64,
    },

    /// A run byte encodes a length of zero.
    #[error("zero-length run at index {0}")]
    ZeroLengthRun(u64),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BwtHeader {
    /// Number of strings in the collection.
    pub num_strings: u64,
    /// Total number of BWT symbols.
    pub num_symbols: u64,
    /// Number of packed runs.
    pub num_runs: u64,
    /// Payload flag, [`FLAG_NO_FM_PAYLOAD`] or [`FLAG_HAS_FM_PAYLOAD`].
    pub flag: u32,
}

fn le_u16(bytes: &[u8]) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(bytes);
    u16::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Read and validate a header.
pub fn read_header<R: Read>(reader: &mut R) -> Result<BwtHeader, FormatError> {
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw)?;
    let magic = le_u16(&raw[0..2]);
    if magic != BWT_MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }
    Ok(BwtHeader {
        num_strings: le_u64(&raw[2..10]),
        num_symbols: le_u64(&raw[10..18]),
        num_runs: le_u64(&raw[18..26]),
        flag: le_u32(&raw[26..30]),
    })
}

/// Read a whole BWT file: header plus runs, validated against each other.
pub fn read_bwt<R: Read>(reader: &mut R) -> Result<(RleString, BwtHeader), FormatError> {
    let header = read_header(reader)?;

    let mut raw_runs = vec![0u8; header.num_runs as usize];
    let mut filled = 0usize;
    while filled < raw_runs.len() {
        let n = reader.read(&mut raw_runs[filled..])?;
        if n == 0 {
            return Err(FormatError::TruncatedRuns {
                declared: header.num_runs,
                available: filled as u64,
            });
        }
        filled += n;
    }

    let mut runs = Vec::with_capacity(raw_runs.len());
    for (i, &byte) in raw_runs.iter().enumerate() {
        let unit = RleUnit::from_byte(byte);
        if unit.run_len() == 0 {
            return Err(FormatError::ZeroLengthRun(i as u64));
        }
        runs.push(unit);
    }

    let rle = RleString::from_runs(runs);
    if rle.len() as u64 != header.num_symbols {
        return Err(FormatError::InconsistentSymbolCount {
            declared: header.num_symbols,
            actual: rle.len() as u64,
        });
    }
    Ok((rle, header))
}

/// Write a BWT in the binary format, with no FM-index payload.
pub fn write_bwt<W: Write>(
    writer: &mut W,
    rle: &RleString,
    num_strings: u64,
) -> Result<(), FormatError> {
    let mut raw = [0u8; HEADER_LEN];
    raw[0..2].copy_from_slice(&BWT_MAGIC.to_le_bytes());
    raw[2..10].copy_from_slice(&num_strings.to_le_bytes());
    raw[10..18].copy_from_slice(&(rle.len() as u64).to_le_bytes());
    raw[18..26].copy_from_slice(&(rle.num_runs() as u64).to_le_bytes());
    raw[26..30].copy_from_slice(&FLAG_NO_FM_PAYLOAD.to_le_bytes());
    writer.write_all(&raw)?;

    let bytes: Vec<u8> = rle.runs().iter().map(|unit| unit.to_byte()).collect();
    writer.write_all(&bytes)?;
    Ok(())
}
