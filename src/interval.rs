//! Suffix-array intervals and backward search.
//!
//! All intervals are half-open `[lower, upper)`. Extension follows the
//! standard FM-index identity `lower' = C(c) + occ(c, lower - 1)` with
//! `occ(c, -1)` taken as zero.

use crate::alphabet::SENTINEL;
use crate::fm_index::FmIndex;

/// Half-open range of suffix-array positions whose suffixes share a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaInterval {
    /// First suffix-array position of the range.
    pub lower: u64,
    /// One past the last suffix-array position of the range.
    pub upper: u64,
}

impl SaInterval {
    /// Interval with explicit bounds.
    #[inline]
    pub fn new(lower: u64, upper: u64) -> Self {
        SaInterval { lower, upper }
    }

    /// The interval covering every suffix of the collection.
    pub fn full_range<const SIGMA: usize>(fm: &FmIndex<SIGMA>) -> Self {
        SaInterval::new(0, fm.len())
    }

    /// The interval of the one-symbol string `symbol`.
    pub fn single_symbol_range<const SIGMA: usize>(fm: &FmIndex<SIGMA>, symbol: u8) -> Self {
        SaInterval::new(fm.c(symbol), fm.bucket_end(symbol))
    }

    /// `true` when the interval matches nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.upper <= self.lower
    }

    /// Number of suffix-array positions covered.
    #[inline]
    pub fn size(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.upper - self.lower
        }
    }

    /// Interval of `symbol · S` given this interval represents `S`.
    ///
    /// An empty interval stays empty.
    pub fn extend_backward<const SIGMA: usize>(&self, fm: &FmIndex<SIGMA>, symbol: u8) -> Self {
        if self.is_empty() {
            return *self;
        }
        let occ_lower = if self.lower > 0 {
            fm.occ(self.lower - 1)[symbol as usize]
        } else {
            0
        };
        let occ_upper = fm.occ(self.upper - 1)[symbol as usize];
        SaInterval::new(fm.c(symbol) + occ_lower, fm.c(symbol) + occ_upper)
    }
}

/// Per-symbol intervals `[low[c], high[c])` of every one-symbol string.
pub fn init_symbol_ranges<const SIGMA: usize>(
    fm: &FmIndex<SIGMA>,
) -> ([u64; SIGMA], [u64; SIGMA]) {
    let mut low = [0u64; SIGMA];
    let mut high = [0u64; SIGMA];
    for symbol in 0..SIGMA {
        low[symbol] = fm.c(symbol as u8);
        high[symbol] = fm.bucket_end(symbol as u8);
    }
    (low, high)
}

/// Extend the interval `[first, last)` backwards by every symbol at once.
///
/// Returns `(low, high)` such that `[low[c], high[c])` is the interval of
/// `c · S` for the string `S` represented by `[first, last)`. Costs one
/// pair of `occ` queries for the whole alphabet.
pub fn extend_all_backward<const SIGMA: usize>(
    fm: &FmIndex<SIGMA>,
    first: u64,
    last: u64,
) -> ([u64; SIGMA], [u64; SIGMA]) {
    let mut low = [0u64; SIGMA];
    let mut high = [0u64; SIGMA];
    let occ_low = if first == 0 || first >= last {
        [0u64; SIGMA]
    } else {
        fm.occ(first - 1)
    };
    let occ_high = if first >= last { [0u64; SIGMA] } else { fm.occ(last - 1) };
    for symbol in 0..SIGMA {
        low[symbol] = fm.c(symbol as u8) + occ_low[symbol];
        high[symbol] = fm.c(symbol as u8) + occ_high[symbol];
    }
    (low, high)
}

/// Interval of every occurrence of `pattern` (rank symbols) in the index.
///
/// Initializes on the last symbol and extends backwards, aborting as soon
/// as the interval empties.
pub fn backward_search<const SIGMA: usize>(fm: &FmIndex<SIGMA>, pattern: &[u8]) -> SaInterval {
    let Some((&last, rest)) = pattern.split_last() else {
        return SaInterval::full_range(fm);
    };
    let mut interval = SaInterval::single_symbol_range(fm, last);
    for &symbol in rest.iter().rev() {
        if interval.is_empty() {
            break;
        }
        interval = interval.extend_backward(fm, symbol);
    }
    interval
}

/// Number of occurrences of `pattern` in the index.
pub fn count_occurrences<const SIGMA: usize>(fm: &FmIndex<SIGMA>, pattern: &[u8]) -> u64 {
    backward_search(fm, pattern).size()
}

/// Recover the `idx`-th string of the collection by LF-walking from its
/// sentinel row until the next sentinel.
pub fn extract_string<const SIGMA: usize>(fm: &FmIndex<SIGMA>, idx: u64) -> Vec<u8> {
    debug_assert!(idx < fm.num_strings(), "string index out of range");
    let mut row = idx;
    let mut out = Vec::new();
    loop {
        let symbol = fm.bwt(row);
        if symbol == SENTINEL {
            break;
        }
        out.push(symbol);
        row = fm.lf_map(row);
    }
    out.reverse();
    out
}

/// `length` symbols of the `idx`-th string starting at `start`.
pub fn extract_substring<const SIGMA: usize>(
    fm: &FmIndex<SIGMA>,
    idx: u64,
    start: usize,
    length: usize,
) -> Vec<u8> {
    let full = extract_string(fm, idx);
    let from = start.min(full.len());
    let to = (start + length).min(full.len());
    full[from..to].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rle::RleString;

    // BWT of "abracadabra$" over the rank alphabet $=0 a=1 b=2 c=3 d=4 r=5.
    fn abracadabra() -> FmIndex<6> {
        FmIndex::from_bwt(RleString::from_symbols([1, 5, 4, 0, 5, 3, 1, 1, 1, 1, 2, 2])).unwrap()
    }

    #[test]
    fn single_symbol_ranges() {
        let fm = abracadabra();
        assert_eq!(SaInterval::single_symbol_range(&fm, 1), SaInterval::new(1, 6));
        assert_eq!(SaInterval::full_range(&fm), SaInterval::new(0, 12));
    }

    #[test]
    fn backward_extension_narrows_the_range() {
        let fm = abracadabra();
        // "a" -> "ra" -> "bra"
        let a = SaInterval::single_symbol_range(&fm, 1);
        let ra = a.extend_backward(&fm, 5);
        assert_eq!(ra, SaInterval::new(10, 12));
        let bra = ra.extend_backward(&fm, 2);
        assert_eq!(bra, SaInterval::new(6, 8));
        assert_eq!(bra.size(), 2);
    }

    #[test]
    fn backward_search_counts_substrings() {
        let fm = abracadabra();
        assert_eq!(count_occurrences(&fm, &[2, 5, 1]), 2); // "bra"
        assert_eq!(count_occurrences(&fm, &[1, 2, 5, 1]), 2); // "abra"
        assert_eq!(count_occurrences(&fm, &[1]), 5); // "a"
        assert_eq!(count_occurrences(&fm, &[3, 1, 4]), 1); // "cad"
        assert_eq!(count_occurrences(&fm, &[4, 4]), 0); // "dd"
    }

    #[test]
    fn empty_intervals_stay_empty() {
        let fm = abracadabra();
        let empty = SaInterval::new(5, 5);
        assert!(empty.is_empty());
        assert_eq!(empty.size(), 0);
        assert!(empty.extend_backward(&fm, 1).is_empty());
    }

    #[test]
    fn extend_all_matches_per_symbol_extension() {
        let fm = abracadabra();
        let a = SaInterval::single_symbol_range(&fm, 1);
        let (low, high) = extend_all_backward(&fm, a.lower, a.upper);
        for symbol in 0..6u8 {
            let one = a.extend_backward(&fm, symbol);
            assert_eq!(low[symbol as usize], one.lower, "lower for symbol {symbol}");
            assert_eq!(high[symbol as usize], one.upper, "upper for symbol {symbol}");
        }
    }

    #[test]
    fn extract_recovers_the_text() {
        let fm = abracadabra();
        // a=1 b=2 c=3 d=4 r=5: "abracadabra"
        assert_eq!(
            extract_string(&fm, 0),
            vec![1, 2, 5, 1, 3, 1, 4, 1, 2, 5, 1]
        );
        assert_eq!(extract_substring(&fm, 0, 4, 3), vec![3, 1, 4]); // "cad"
        assert_eq!(extract_substring(&fm, 0, 9, 10), vec![5, 1]); // clipped tail
    }
}
