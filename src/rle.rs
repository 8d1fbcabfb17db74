//! Run-length encoded symbol strings.
//!
//! The BWT of a read collection is highly repetitive, so it is stored as a
//! sequence of packed runs: one byte per run, the high 3 bits holding the
//! symbol and the low 5 bits the run length. Random access is served by a
//! sparse table of position marks so `at` never scans more than one mark
//! stride of runs.

/// Bits the symbol is shifted by inside a packed run byte.
const VALUE_SHIFT: u8 = 5;
/// Mask selecting the run length inside a packed run byte.
const LENGTH_MASK: u8 = 0x1F;

/// Maximum length a single run can carry (5 bits).
pub const MAX_RUN_LENGTH: u8 = 31;
/// Maximum symbol a run can carry (3 bits).
pub const MAX_SYMBOL: u8 = 7;

/// Number of logical positions between two consecutive position marks.
pub const MARK_STEP: usize = 1024;

/// One run of identical symbols, packed as `(symbol << 5) | length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleUnit(u8);

impl RleUnit {
    /// Start a new run of length 1 for `symbol`.
    #[inline]
    pub fn new(symbol: u8) -> Self {
        debug_assert!(symbol <= MAX_SYMBOL, "symbol {symbol} exceeds 3 bits");
        RleUnit((symbol << VALUE_SHIFT) | 1)
    }

    /// Reinterpret a raw byte (for example one read from a BWT file) as a run.
    #[inline]
    pub fn from_byte(raw: u8) -> Self {
        RleUnit(raw)
    }

    /// The packed byte representation.
    #[inline]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Symbol carried by this run.
    #[inline]
    pub fn symbol(self) -> u8 {
        self.0 >> VALUE_SHIFT
    }

    /// Number of symbols in this run, `1..=31` for well-formed runs.
    #[inline]
    pub fn run_len(self) -> u8 {
        self.0 & LENGTH_MASK
    }

    /// `true` when the run cannot absorb another symbol.
    #[inline]
    pub fn is_full(self) -> bool {
        self.run_len() == MAX_RUN_LENGTH
    }

    #[inline]
    fn increment(&mut self) {
        debug_assert!(!self.is_full());
        self.0 += 1;
    }
}

/// Anchor for random access: position `k * MARK_STEP` falls inside
/// `runs[run]` at `offset` symbols past the run start.
#[derive(Debug, Clone, Copy)]
struct PositionMark {
    run: usize,
    offset: u8,
}

/// A run-length encoded string of 3-bit symbols.
///
/// Invariants: run lengths sum to `len`, every run has a non-zero length,
/// and adjacent runs only share a symbol when the earlier one is full.
#[derive(Debug, Clone, Default)]
pub struct RleString {
    runs: Vec<RleUnit>,
    len: usize,
    marks: Vec<PositionMark>,
}

impl RleString {
    /// Create an empty string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one symbol, extending the tail run when possible.
    pub fn append(&mut self, symbol: u8) {
        debug_assert!(symbol <= MAX_SYMBOL, "symbol {symbol} exceeds 3 bits");
        match self.runs.last_mut() {
            Some(last) if last.symbol() == symbol && !last.is_full() => last.increment(),
            _ => self.runs.push(RleUnit::new(symbol)),
        }
        if self.len % MARK_STEP == 0 {
            // The symbol just written is the last of the tail run.
            let run = self.runs.len() - 1;
            let offset = self.runs[run].run_len() - 1;
            self.marks.push(PositionMark { run, offset });
        }
        self.len += 1;
    }

    /// Bulk-construct from a symbol sequence.
    pub fn from_symbols<I: IntoIterator<Item = u8>>(symbols: I) -> Self {
        let mut rle = Self::new();
        for symbol in symbols {
            rle.append(symbol);
        }
        rle
    }

    /// Reassemble from previously packed runs, rebuilding the position marks.
    pub fn from_runs(runs: Vec<RleUnit>) -> Self {
        let mut marks = Vec::new();
        let mut pos = 0usize;
        for (run, unit) in runs.iter().enumerate() {
            debug_assert!(unit.run_len() > 0, "zero-length run at index {run}");
            let end = pos + unit.run_len() as usize;
            let mut boundary = marks.len() * MARK_STEP;
            while boundary < end {
                marks.push(PositionMark {
                    run,
                    offset: (boundary - pos) as u8,
                });
                boundary += MARK_STEP;
            }
            pos = end;
        }
        RleString {
            runs,
            len: pos,
            marks,
        }
    }

    /// Total number of symbols.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when no symbols have been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of runs in the encoding.
    #[inline]
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    /// The packed runs.
    #[inline]
    pub fn runs(&self) -> &[RleUnit] {
        &self.runs
    }

    /// Symbol at logical position `i`.
    ///
    /// Jumps to the nearest preceding position mark, then walks forward
    /// through at most `MARK_STEP` symbols worth of runs.
    pub fn at(&self, i: usize) -> u8 {
        debug_assert!(i < self.len, "index {i} out of range for length {}", self.len);
        let mark = self.marks[i / MARK_STEP];
        let mut run = mark.run;
        let mut run_start = (i / MARK_STEP) * MARK_STEP - mark.offset as usize;
        while run_start + self.runs[run].run_len() as usize <= i {
            run_start += self.runs[run].run_len() as usize;
            run += 1;
        }
        self.runs[run].symbol()
    }

    /// Iterate over the decoded symbols.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.runs
            .iter()
            .flat_map(|unit| std::iter::repeat(unit.symbol()).take(unit.run_len() as usize))
    }
}
