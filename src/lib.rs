//! # bwtkit
//!
//! A compact FM-index over the Burrows-Wheeler transform of a collection
//! of sentinel-terminated strings, together with an incremental BWT
//! constructor and a canonical k-mer counter.
//!
//! ## Components
//!
//! 1. **BCR construction** ([`bcr`]): builds the multi-string BWT by
//!    inserting one symbol per string per pass, without a suffix array.
//! 2. **Run-length BWT** ([`rle`]): packed (symbol, length) runs with
//!    sparse position marks for amortized O(1) random access.
//! 3. **FM-index** ([`fm_index`]): two-tier rank marks over the runs,
//!    answering `occ` and `bwt` queries; the C-array.
//! 4. **Backward search** ([`interval`]): suffix-array intervals, single
//!    and alphabet-wide backward extension, string extraction.
//! 5. **K-mer enumeration** ([`kmer`]): a multi-threaded depth-first
//!    search emitting every canonical k-mer with strand counts.
//!
//! ## Usage Example
//!
//! ```
//! use bwtkit::{alphabet, BcrBuilder, DnaIndex, RleString};
//! use bwtkit::interval::count_occurrences;
//!
//! let mut text = alphabet::encode(b"ACGTACGT").unwrap();
//! text.push(alphabet::SENTINEL);
//! let bwt = BcrBuilder::new(&text).build();
//! let index = DnaIndex::from_bwt(RleString::from_symbols(bwt)).unwrap();
//! let pattern = alphabet::encode(b"ACG").unwrap();
//! assert_eq!(count_occurrences(&index, &pattern), 2);
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod alphabet;
pub mod bcr;
pub mod fm_index;
pub mod interval;
pub mod io;
pub mod kmer;
pub mod rle;

// Re-exports for convenience
pub use alphabet::{AlphabetError, DNA_ALPHABET_SIZE, SENTINEL};
pub use bcr::BcrBuilder;
pub use fm_index::{DnaIndex, FmIndex, IndexError, IndexStats};
pub use interval::SaInterval;
pub use io::{BwtHeader, FormatError};
pub use kmer::{KmerEnumerator, KmerError};
pub use rle::{RleString, RleUnit};
