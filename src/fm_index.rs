//! Rank-indexed FM-index over a run-length encoded BWT.
//!
//! Rank queries are answered from two tiers of marks laid over the run
//! sequence: large marks every `2^16` positions carrying absolute 64-bit
//! symbol counts, and small marks every `2^7` positions carrying 16-bit
//! deltas relative to the nearest preceding large mark. A query adds the
//! two marks and walks forward through at most one small stride of runs.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::io::{read_bwt, FormatError};
use crate::rle::{RleString, MAX_RUN_LENGTH};

/// Positions between two large marks (`2^16`).
pub const LARGE_SHIFT: u32 = 16;
/// Positions between two small marks (`2^7`).
pub const SMALL_SHIFT: u32 = 7;

// The mark math assumes one mark boundary per run at most, and that small
// boundaries subdivide large ones.
const _: () = assert!((1u64 << SMALL_SHIFT) > MAX_RUN_LENGTH as u64);
const _: () = assert!(LARGE_SHIFT > SMALL_SHIFT);

/// FM-index over the DNA alphabet.
pub type DnaIndex = FmIndex<{ crate::alphabet::DNA_ALPHABET_SIZE }>;

/// Errors surfaced while constructing an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The BWT file could not be decoded.
    #[error("bwt format error: {0}")]
    Format(#[from] FormatError),

    /// A small-mark delta does not fit in 16 bits; the large/small stride
    /// ratio is misconfigured.
    #[error("rank mark delta overflows 16 bits in block {block}")]
    MarkDeltaOverflow {
        /// Index of the small-mark block where the overflow occurred.
        block: usize,
    },

    /// A run carries a symbol outside the alphabet.
    #[error("symbol {symbol} does not fit in an alphabet of size {alphabet_size}")]
    SymbolOutOfAlphabet {
        /// Offending symbol.
        symbol: u8,
        /// Alphabet size of the index being built.
        alphabet_size: usize,
    },
}

/// Absolute mark: counts of every symbol in the BWT prefix ending at the
/// start of run `run_index`, which is the run containing the mark boundary.
#[derive(Debug, Clone)]
struct LargeMark<const SIGMA: usize> {
    run_index: usize,
    counts: [u64; SIGMA],
}

/// Relative mark: the same two fields expressed as deltas against the
/// nearest preceding large mark.
#[derive(Debug, Clone)]
struct SmallMark<const SIGMA: usize> {
    run_delta: u16,
    counts: [u16; SIGMA],
}

/// Summary statistics of an index, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    /// Total number of BWT symbols.
    pub num_symbols: u64,
    /// Number of strings in the indexed collection.
    pub num_strings: u64,
    /// Number of runs in the encoding.
    pub num_runs: usize,
    /// Mean run length.
    pub avg_run_len: f64,
    /// Number of large marks.
    pub num_large_marks: usize,
    /// Number of small marks.
    pub num_small_marks: usize,
}

/// A run-length FM-index parameterized by alphabet size.
///
/// Symbols everywhere in the query layer are the stored ranks `0..SIGMA`;
/// rank 0 is the sentinel. Construction computes the C-array and both mark
/// tiers in one forward pass over the runs; the index is immutable
/// afterwards.
#[derive(Debug)]
pub struct FmIndex<const SIGMA: usize> {
    rle: RleString,
    c: [u64; SIGMA],
    large_marks: Vec<LargeMark<SIGMA>>,
    small_marks: Vec<SmallMark<SIGMA>>,
    num_strings: u64,
}

impl<const SIGMA: usize> FmIndex<SIGMA> {
    /// Build an index over a run-length encoded BWT.
    pub fn from_bwt(rle: RleString) -> Result<Self, IndexError> {
        let total = rle.len() as u64;
        let mut large_marks: Vec<LargeMark<SIGMA>> =
            Vec::with_capacity((rle.len() >> LARGE_SHIFT) + 2);
        let mut small_marks: Vec<SmallMark<SIGMA>> =
            Vec::with_capacity((rle.len() >> SMALL_SHIFT) + 2);
        let mut running = [0u64; SIGMA];
        let mut pos = 0u64;

        for (run_index, unit) in rle.runs().iter().enumerate() {
            let symbol = unit.symbol();
            if symbol as usize >= SIGMA {
                return Err(IndexError::SymbolOutOfAlphabet {
                    symbol,
                    alphabet_size: SIGMA,
                });
            }
            let end = pos + unit.run_len() as u64;
            // A mark boundary inside [pos, end) is anchored to this run:
            // it records the run index and the absolute counts at `pos`, so
            // a query reconstructs by addition and a forward walk only.
            while ((large_marks.len() as u64) << LARGE_SHIFT) < end {
                large_marks.push(LargeMark {
                    run_index,
                    counts: running,
                });
            }
            while ((small_marks.len() as u64) << SMALL_SHIFT) < end {
                small_marks.push(Self::relative_mark(
                    small_marks.len(),
                    run_index,
                    &running,
                    large_marks.last().expect("large mark precedes small mark"),
                )?);
            }
            running[symbol as usize] += unit.run_len() as u64;
            pos = end;
        }

        // Terminal marks let a query at the very end of the string resolve
        // without walking any runs.
        while ((large_marks.len() as u64) << LARGE_SHIFT) <= total {
            large_marks.push(LargeMark {
                run_index: rle.num_runs(),
                counts: running,
            });
        }
        while ((small_marks.len() as u64) << SMALL_SHIFT) <= total {
            small_marks.push(Self::relative_mark(
                small_marks.len(),
                rle.num_runs(),
                &running,
                large_marks.last().expect("large mark precedes small mark"),
            )?);
        }

        let mut c = [0u64; SIGMA];
        let mut sum = 0u64;
        for (bucket, &count) in c.iter_mut().zip(running.iter()) {
            *bucket = sum;
            sum += count;
        }
        debug_assert_eq!(sum, total);

        let index = FmIndex {
            num_strings: running[0],
            rle,
            c,
            large_marks,
            small_marks,
        };
        debug!(
            num_symbols = index.len(),
            num_runs = index.rle.num_runs(),
            num_large_marks = index.large_marks.len(),
            num_small_marks = index.small_marks.len(),
            "fm-index constructed"
        );
        Ok(index)
    }

    /// Read the binary BWT format and build an index over it.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self, IndexError> {
        let (rle, _header) = read_bwt(reader)?;
        Self::from_bwt(rle)
    }

    /// Open a BWT file and build an index over it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(FormatError::from)?;
        Self::from_reader(&mut BufReader::new(file))
    }

    fn relative_mark(
        block: usize,
        run_index: usize,
        running: &[u64; SIGMA],
        base: &LargeMark<SIGMA>,
    ) -> Result<SmallMark<SIGMA>, IndexError> {
        let overflow = |_| IndexError::MarkDeltaOverflow { block };
        let run_delta = u16::try_from(run_index - base.run_index).map_err(overflow)?;
        let mut counts = [0u16; SIGMA];
        for (delta, (&now, &before)) in
            counts.iter_mut().zip(running.iter().zip(base.counts.iter()))
        {
            *delta = u16::try_from(now - before).map_err(overflow)?;
        }
        Ok(SmallMark { run_delta, counts })
    }

    /// Total number of symbols in the BWT.
    #[inline]
    pub fn len(&self) -> u64 {
        self.rle.len() as u64
    }

    /// `true` when the BWT holds no symbols.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rle.is_empty()
    }

    /// Number of strings in the indexed collection (sentinel occurrences).
    #[inline]
    pub fn num_strings(&self) -> u64 {
        self.num_strings
    }

    /// Number of BWT symbols strictly smaller than `symbol`; equivalently
    /// the suffix-array index where the `symbol` bucket starts.
    #[inline]
    pub fn c(&self, symbol: u8) -> u64 {
        self.c[symbol as usize]
    }

    /// Suffix-array index one past the end of the `symbol` bucket.
    #[inline]
    pub fn bucket_end(&self, symbol: u8) -> u64 {
        let next = symbol as usize + 1;
        if next < SIGMA {
            self.c[next]
        } else {
            self.len()
        }
    }

    /// Symbol at BWT position `i` (a stored rank in `0..SIGMA`).
    #[inline]
    pub fn bwt(&self, i: u64) -> u8 {
        self.rle.at(i as usize)
    }

    /// Occurrence counts of every symbol in the inclusive prefix `bwt[0..=i]`.
    pub fn occ(&self, i: u64) -> [u64; SIGMA] {
        debug_assert!(i < self.len(), "occ({i}) out of range for length {}", self.len());
        let prefix = i + 1;
        let large = &self.large_marks[(prefix >> LARGE_SHIFT) as usize];
        let small = &self.small_marks[(prefix >> SMALL_SHIFT) as usize];

        let mut counts = large.counts;
        for (count, &delta) in counts.iter_mut().zip(small.counts.iter()) {
            *count += delta as u64;
        }
        let mut run_index = large.run_index + small.run_delta as usize;
        // The marks anchor at the start of the run containing the boundary,
        // so the walk only ever moves forward.
        let mut covered: u64 = counts.iter().sum();
        let runs = self.rle.runs();
        while covered < prefix {
            let unit = runs[run_index];
            let take = (unit.run_len() as u64).min(prefix - covered);
            counts[unit.symbol() as usize] += take;
            covered += take;
            run_index += 1;
        }
        counts
    }

    /// Occurrences of one symbol in the inclusive prefix `bwt[0..=i]`.
    #[inline]
    pub fn occ_symbol(&self, symbol: u8, i: u64) -> u64 {
        self.occ(i)[symbol as usize]
    }

    /// Symbol of the first suffix-array column at row `i`: the greatest
    /// symbol whose C-bucket starts at or before `i`.
    pub fn first_symbol(&self, i: u64) -> u8 {
        debug_assert!(i < self.len());
        // invariant: the answer lies in [lower, upper)
        let mut lower = 0usize;
        let mut upper = SIGMA;
        while upper - lower > 1 {
            let mid = lower + (upper - lower) / 2;
            if self.c[mid] <= i {
                lower = mid;
            } else {
                upper = mid;
            }
        }
        lower as u8
    }

    /// LF-mapping: the suffix-array row of the text predecessor of row `i`.
    #[inline]
    pub fn lf_map(&self, i: u64) -> u64 {
        let symbol = self.bwt(i);
        self.c(symbol) + self.occ(i)[symbol as usize] - 1
    }

    /// Summary statistics for diagnostics.
    pub fn stats(&self) -> IndexStats {
        let num_runs = self.rle.num_runs();
        IndexStats {
            num_symbols: self.len(),
            num_strings: self.num_strings,
            num_runs,
            avg_run_len: if num_runs == 0 {
                0.0
            } else {
                self.len() as f64 / num_runs as f64
            },
            num_large_marks: self.large_marks.len(),
            num_small_marks: self.small_marks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rle::RleString;

    // BWT of "abracadabra$" over the rank alphabet $=0 a=1 b=2 c=3 d=4 r=5.
    fn abracadabra_bwt() -> RleString {
        // "ard$rcaaaabb"
        RleString::from_symbols([1, 5, 4, 0, 5, 3, 1, 1, 1, 1, 2, 2])
    }

    #[test]
    fn c_array_matches_known_values() {
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        assert_eq!(fm.len(), 12);
        let c: Vec<u64> = (0..6).map(|s| fm.c(s)).collect();
        assert_eq!(c, vec![0, 1, 6, 8, 9, 10]);
        assert_eq!(fm.bucket_end(5), 12);
        assert_eq!(fm.num_strings(), 1);
    }

    #[test]
    fn occ_matches_known_values() {
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        assert_eq!(fm.occ_symbol(2, 11), 2); // b in the whole string
        assert_eq!(fm.occ_symbol(1, 9), 5); // a in "ard$rcaaaa"
        assert_eq!(fm.occ_symbol(0, 3), 1); // $ in "ard$"
    }

    #[test]
    fn bwt_access_returns_stored_ranks() {
        let symbols = [1, 5, 4, 0, 5, 3, 1, 1, 1, 1, 2, 2];
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        for (i, &s) in symbols.iter().enumerate() {
            assert_eq!(fm.bwt(i as u64), s);
        }
    }

    #[test]
    fn first_column_symbols_follow_the_buckets() {
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        // First column of the sorted rotations: $ aaaaa bb c d rr
        let expected = [0, 1, 1, 1, 1, 1, 2, 2, 3, 4, 5, 5];
        for (i, &symbol) in expected.iter().enumerate() {
            assert_eq!(fm.first_symbol(i as u64), symbol, "row {i}");
        }
    }

    #[test]
    fn lf_map_cycles_through_the_text() {
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        // Walking LF from the sentinel row visits every row exactly once.
        let mut seen = vec![false; fm.len() as usize];
        let mut row = 0u64;
        for _ in 0..fm.len() {
            assert!(!seen[row as usize]);
            seen[row as usize] = true;
            row = fm.lf_map(row);
        }
        assert_eq!(row, 0);
        assert!(seen.iter().all(|&v| v));
    }

    #[test]
    fn occ_counts_sum_to_prefix_length() {
        let fm = FmIndex::<6>::from_bwt(abracadabra_bwt()).unwrap();
        for i in 0..fm.len() {
            let total: u64 = fm.occ(i).iter().sum();
            assert_eq!(total, i + 1);
        }
    }

    #[test]
    fn rejects_symbols_outside_the_alphabet() {
        let rle = RleString::from_symbols([1, 2, 6]);
        let err = FmIndex::<5>::from_bwt(rle).unwrap_err();
        assert!(matches!(
            err,
            IndexError::SymbolOutOfAlphabet {
                symbol: 6,
                alphabet_size: 5
            }
        ));
    }

    #[test]
    fn empty_bwt_builds_an_empty_index() {
        let fm = FmIndex::<5>::from_bwt(RleString::new()).unwrap();
        assert!(fm.is_empty());
        assert_eq!(fm.c(4), 0);
        assert_eq!(fm.bucket_end(4), 0);
    }

    /// Deterministic pseudo-random symbol stream.
    fn lcg_symbols(n: usize, mut state: u64) -> impl Iterator<Item = u8> {
        (0..n).map(move |_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % 5) as u8
        })
    }

    #[test]
    fn marks_reconstruct_prefix_counts() {
        // Long enough to cross several large-mark windows.
        let n = (4usize << LARGE_SHIFT) + 4321;
        let symbols: Vec<u8> = lcg_symbols(n, 7).collect();
        let fm = FmIndex::<5>::from_bwt(RleString::from_symbols(symbols.iter().copied())).unwrap();

        let large_step = 1usize << LARGE_SHIFT;
        let small_step = 1usize << SMALL_SHIFT;
        let mut interesting = vec![0, 1, n - 2, n - 1];
        interesting.extend((0..n).step_by(997));
        for boundary in (0..=n).step_by(small_step) {
            for delta in -2i64..=2 {
                let i = boundary as i64 + delta;
                if (0..n as i64).contains(&i) {
                    interesting.push(i as usize);
                }
            }
        }
        for boundary in (0..=n).step_by(large_step) {
            for delta in -2i64..=2 {
                let i = boundary as i64 + delta;
                if (0..n as i64).contains(&i) {
                    interesting.push(i as usize);
                }
            }
        }
        interesting.sort_unstable();
        interesting.dedup();

        let mut brute = [0u64; 5];
        let mut next = interesting.iter().peekable();
        for (i, &s) in symbols.iter().enumerate() {
            brute[s as usize] += 1;
            if next.peek() == Some(&&i) {
                assert_eq!(fm.occ(i as u64), brute, "occ mismatch at {i}");
                next.next();
            }
        }
        assert!(next.peek().is_none());
    }
}
