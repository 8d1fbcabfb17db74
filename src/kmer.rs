//! Canonical k-mer enumeration over FM-indices.
//!
//! A depth-first search over backward extensions visits every k-length
//! path of non-sentinel symbols present in the source index. Each k-mer is
//! reported once, in canonical form (the lexicographically smaller of the
//! k-mer and its reverse complement), with its forward and
//! reverse-complement occurrence counts; additional indices contribute
//! extra count columns.
//!
//! Work is shared by a fixed pool of threads through a global frame stack
//! guarded by a mutex and a condition variable; a counter of in-flight
//! workers decides termination. Output lines are serialized by a second
//! mutex.

use std::io::{self, Write};
use std::sync::{Condvar, Mutex};
use std::thread;

use thiserror::Error;

use crate::alphabet::{self, DNA_ALPHABET_SIZE};
use crate::fm_index::FmIndex;
use crate::interval::{self, backward_search};

const SIGMA: usize = DNA_ALPHABET_SIZE;

/// Default k-mer length of the `count` tool.
pub const DEFAULT_KMER_LENGTH: usize = 27;
/// Default worker count.
pub const DEFAULT_THREADS: usize = 4;

/// Errors that prevent an enumeration from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KmerError {
    /// `k` must be positive and odd (an odd length rules out k-mers that
    /// equal their own reverse complement).
    #[error("invalid k-mer length {0}: must be positive and odd")]
    InvalidKmerLength(usize),

    /// The worker pool needs at least one thread.
    #[error("worker pool requires at least one thread")]
    NoThreads,
}

/// One unit of pending search work: the symbols accumulated while
/// extending backwards (the reversed k-mer prefix) and the per-symbol
/// extension intervals of that path.
#[derive(Debug, Clone)]
struct Frame {
    path: Vec<u8>,
    low: [u64; SIGMA],
    high: [u64; SIGMA],
}

struct Shared {
    frames: Vec<Frame>,
    active: usize,
    error: Option<io::Error>,
}

/// Multi-threaded canonical k-mer enumerator.
///
/// The first index is the source: the k-mers emitted are exactly those
/// occurring in it. Every extra index adds a forward and a
/// reverse-complement count column to each output line.
#[derive(Debug)]
pub struct KmerEnumerator<'a> {
    source: &'a FmIndex<SIGMA>,
    extras: &'a [FmIndex<SIGMA>],
    k: usize,
    threads: usize,
}

impl<'a> KmerEnumerator<'a> {
    /// Set up an enumeration of the `k`-mers of `source`.
    pub fn new(source: &'a FmIndex<SIGMA>, k: usize) -> Result<Self, KmerError> {
        if k == 0 || k % 2 == 0 {
            return Err(KmerError::InvalidKmerLength(k));
        }
        Ok(KmerEnumerator {
            source,
            extras: &[],
            k,
            threads: DEFAULT_THREADS,
        })
    }

    /// Count every emitted k-mer in these indices as well.
    pub fn with_extra_indices(mut self, extras: &'a [FmIndex<SIGMA>]) -> Self {
        self.extras = extras;
        self
    }

    /// Use `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, KmerError> {
        if threads == 0 {
            return Err(KmerError::NoThreads);
        }
        self.threads = threads;
        Ok(self)
    }

    /// Run the search, writing one tab-separated line per canonical k-mer.
    ///
    /// Line ordering depends on scheduling; the emitted multiset does not.
    /// An empty source index emits nothing.
    pub fn run<W: Write + Send>(&self, out: W) -> io::Result<()> {
        let (low, high) = interval::init_symbol_ranges(self.source);
        let shared = Mutex::new(Shared {
            frames: vec![Frame {
                path: Vec::new(),
                low,
                high,
            }],
            active: 0,
            error: None,
        });
        let ready = Condvar::new();
        let out = Mutex::new(out);

        thread::scope(|scope| {
            for _ in 0..self.threads {
                scope.spawn(|| self.worker(&shared, &ready, &out));
            }
        });

        let mut shared = shared.into_inner().unwrap();
        if let Some(error) = shared.error.take() {
            return Err(error);
        }
        out.into_inner().unwrap().flush()
    }

    fn worker<W: Write>(&self, shared: &Mutex<Shared>, ready: &Condvar, out: &Mutex<W>) {
        loop {
            let frame = {
                let mut guard = shared.lock().unwrap();
                loop {
                    if let Some(frame) = guard.frames.pop() {
                        guard.active += 1;
                        break frame;
                    }
                    if guard.active == 0 {
                        // Nothing left anywhere; wake the other sleepers so
                        // they can observe the same state and exit.
                        ready.notify_all();
                        return;
                    }
                    guard = ready.wait(guard).unwrap();
                }
            };

            let result = self.explore(&frame, shared, ready, out);

            let mut guard = shared.lock().unwrap();
            if let Err(error) = result {
                // First failure wins; dropping the pending frames makes
                // every worker drain out quickly.
                guard.error.get_or_insert(error);
                guard.frames.clear();
            }
            guard.active -= 1;
            if guard.active == 0 && guard.frames.is_empty() {
                ready.notify_all();
            }
        }
    }

    /// Expand one frame: emit completed k-mers, push longer paths.
    fn explore<W: Write>(
        &self,
        frame: &Frame,
        shared: &Mutex<Shared>,
        ready: &Condvar,
        out: &Mutex<W>,
    ) -> io::Result<()> {
        for symbol in 1..SIGMA as u8 {
            let (low, high) = (
                frame.low[symbol as usize],
                frame.high[symbol as usize],
            );
            if low >= high {
                continue;
            }
            let mut path = frame.path.clone();
            path.push(symbol);

            if path.len() == self.k {
                self.emit(&path, high - low, out)?;
            } else {
                let (next_low, next_high) =
                    interval::extend_all_backward(self.source, low, high);
                let mut guard = shared.lock().unwrap();
                guard.frames.push(Frame {
                    path,
                    low: next_low,
                    high: next_high,
                });
                ready.notify_one();
            }
        }
        Ok(())
    }

    /// Emit the canonical line for a completed path.
    ///
    /// `path` holds the k-mer reversed (symbols were accumulated while
    /// extending backwards); complementing it without reversing yields the
    /// reverse complement of the forward k-mer.
    fn emit<W: Write>(&self, path: &[u8], fwd_count: u64, out: &Mutex<W>) -> io::Result<()> {
        let fwd: Vec<u8> = path.iter().rev().copied().collect();
        let rc: Vec<u8> = path.iter().map(|&s| alphabet::complement(s)).collect();
        let rc_count = backward_search(self.source, &rc).size();

        let (kmer, kmer_rc, count, count_rc) = if fwd < rc {
            (&fwd, &rc, fwd_count, rc_count)
        } else if rc_count == 0 {
            // Not canonical, but the canonical form never occurs in the
            // source, so the search will never reach it. Report the pair
            // now under the canonical spelling.
            (&rc, &fwd, rc_count, fwd_count)
        } else {
            // The reverse complement occurs and is smaller; its own
            // traversal emits this pair.
            return Ok(());
        };

        let mut line = format!("{}\t{}\t{}", alphabet::decode(kmer), count, count_rc);
        for extra in self.extras {
            let fwd_extra = backward_search(extra, kmer).size();
            let rc_extra = backward_search(extra, kmer_rc).size();
            line.push_str(&format!("\t{fwd_extra}\t{rc_extra}"));
        }

        let mut guard = out.lock().unwrap();
        writeln!(guard, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcr::BcrBuilder;
    use crate::rle::RleString;
    use test_case::test_case;

    fn index_of(reads: &[&str]) -> FmIndex<SIGMA> {
        let mut text = Vec::new();
        for read in reads {
            text.extend(alphabet::encode(read.as_bytes()).unwrap());
            text.push(0);
        }
        let bwt = BcrBuilder::new(&text).build();
        FmIndex::from_bwt(RleString::from_symbols(bwt)).unwrap()
    }

    fn run_to_lines(enumerator: &KmerEnumerator<'_>) -> Vec<String> {
        let mut buffer = Vec::new();
        enumerator.run(&mut buffer).unwrap();
        let mut lines: Vec<String> = String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect();
        lines.sort();
        lines
    }

    #[test_case(0)]
    #[test_case(2)]
    #[test_case(26)]
    fn rejects_invalid_lengths(k: usize) {
        let fm = index_of(&["ACGT"]);
        assert_eq!(
            KmerEnumerator::new(&fm, k).unwrap_err(),
            KmerError::InvalidKmerLength(k)
        );
    }

    #[test]
    fn rejects_empty_worker_pool() {
        let fm = index_of(&["ACGT"]);
        assert_eq!(
            KmerEnumerator::new(&fm, 3).unwrap().with_threads(0).unwrap_err(),
            KmerError::NoThreads
        );
    }

    #[test]
    fn revcomp_pair_collapses_to_one_line() {
        // TGT is the reverse complement of ACA: exactly one canonical
        // 3-mer, seen once on each strand.
        let fm = index_of(&["ACA", "TGT"]);
        let enumerator = KmerEnumerator::new(&fm, 3).unwrap();
        assert_eq!(run_to_lines(&enumerator), vec!["ACA\t1\t1".to_owned()]);
    }

    #[test]
    fn non_canonical_kmer_without_revcomp_is_still_reported() {
        // GGG alone: canonical CCC never occurs, so the pair is reported
        // under the canonical spelling with a zero forward count.
        let fm = index_of(&["GGG"]);
        let enumerator = KmerEnumerator::new(&fm, 3).unwrap();
        assert_eq!(run_to_lines(&enumerator), vec!["CCC\t0\t1".to_owned()]);
    }

    #[test]
    fn counts_cover_every_occurrence() {
        let fm = index_of(&["AACAA", "AACAA", "TTGTT"]);
        let enumerator = KmerEnumerator::new(&fm, 3).unwrap();
        // AAC(x2) / GTT(x1), ACA(x2) / TGT(x1), CAA(x2) / TTG(x1).
        assert_eq!(
            run_to_lines(&enumerator),
            vec![
                "AAC\t2\t1".to_owned(),
                "ACA\t2\t1".to_owned(),
                "CAA\t2\t1".to_owned(),
            ]
        );
    }

    #[test]
    fn extra_indices_append_count_columns() {
        let fm = index_of(&["ACA"]);
        let extras = vec![index_of(&["ACA", "ACA"]), index_of(&["TGT"])];
        let enumerator = KmerEnumerator::new(&fm, 3)
            .unwrap()
            .with_extra_indices(&extras);
        assert_eq!(
            run_to_lines(&enumerator),
            vec!["ACA\t1\t0\t2\t0\t0\t1".to_owned()]
        );
    }

    #[test]
    fn empty_source_emits_nothing() {
        let fm = FmIndex::from_bwt(RleString::new()).unwrap();
        let enumerator = KmerEnumerator::new(&fm, 3).unwrap();
        assert!(run_to_lines(&enumerator).is_empty());
    }

    #[test]
    fn output_is_stable_across_thread_counts() {
        let fm = index_of(&["ACGTACGTGCA", "TTGACGTACGA", "CCCGGGAATTC"]);
        let single = run_to_lines(&KmerEnumerator::new(&fm, 5).unwrap().with_threads(1).unwrap());
        assert!(!single.is_empty());
        for threads in [2, 4, 8] {
            let multi = run_to_lines(
                &KmerEnumerator::new(&fm, 5).unwrap().with_threads(threads).unwrap(),
            );
            assert_eq!(multi, single, "thread count {threads} changed the output");
        }
    }
}
