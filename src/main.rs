use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bwtkit::kmer::{DEFAULT_KMER_LENGTH, DEFAULT_THREADS};
use bwtkit::{alphabet, interval, io as bwt_io, BcrBuilder, DnaIndex, KmerEnumerator, RleString};

#[derive(Parser, Debug)]
#[command(name = "bwtkit", about = "Build run-length BWT indexes and count canonical k-mers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a BWT file from a read set using the incremental BCR constructor.
    Build {
        /// Reads file (plain FASTA or one sequence per line).
        input: PathBuf,
        /// Output BWT file.
        output: PathBuf,
    },
    /// Enumerate the canonical k-mers of a source BWT with strand counts.
    Count {
        /// Source BWT file; additional files contribute extra count columns.
        #[arg(required = true)]
        bwt_files: Vec<PathBuf>,
        /// K-mer length; must be odd.
        #[arg(short, long, default_value_t = DEFAULT_KMER_LENGTH)]
        kmer_size: usize,
        /// Number of worker threads.
        #[arg(long, default_value_t = DEFAULT_THREADS)]
        threads: usize,
    },
    /// Recover the original reads from a BWT file.
    Extract {
        /// BWT file to decode.
        bwt: PathBuf,
    },
    /// Print summary statistics for a BWT file.
    Info {
        /// BWT file to inspect.
        bwt: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build { input, output } => run_build(input, output),
        Commands::Count {
            bwt_files,
            kmer_size,
            threads,
        } => run_count(bwt_files, kmer_size, threads),
        Commands::Extract { bwt } => run_extract(bwt),
        Commands::Info { bwt } => run_info(bwt),
    }
}

fn run_build(input: PathBuf, output: PathBuf) -> Result<()> {
    let reads = read_sequences(&input)
        .with_context(|| format!("failed to read sequences from {}", input.display()))?;
    if reads.is_empty() {
        bail!("no sequences found in {}", input.display());
    }

    let mut text = Vec::new();
    for (idx, read) in reads.iter().enumerate() {
        let ranks = alphabet::encode(read)
            .with_context(|| format!("sequence {} is not plain DNA", idx + 1))?;
        text.extend(ranks);
        text.push(alphabet::SENTINEL);
    }
    info!(reads = reads.len(), symbols = text.len(), "running BCR construction");

    let builder = BcrBuilder::new(&text);
    let num_strings = builder.num_strings() as u64;
    let rle = RleString::from_symbols(builder.build());
    info!(
        runs = rle.num_runs(),
        avg_run_len = rle.len() as f64 / rle.num_runs().max(1) as f64,
        "BWT encoded"
    );

    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    bwt_io::write_bwt(&mut writer, &rle, num_strings)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn run_count(bwt_files: Vec<PathBuf>, kmer_size: usize, threads: usize) -> Result<()> {
    let mut indices = Vec::with_capacity(bwt_files.len());
    for path in &bwt_files {
        let index = DnaIndex::from_path(path)
            .with_context(|| format!("failed to load BWT from {}", path.display()))?;
        info!(file = %path.display(), symbols = index.len(), "index loaded");
        indices.push(index);
    }

    let Some((source, extras)) = indices.split_first() else {
        bail!("at least one BWT file is required");
    };
    let enumerator = KmerEnumerator::new(source, kmer_size)?
        .with_extra_indices(extras)
        .with_threads(threads)?;

    enumerator
        .run(BufWriter::new(std::io::stdout()))
        .context("k-mer enumeration failed")?;
    Ok(())
}

fn run_extract(bwt: PathBuf) -> Result<()> {
    let index = DnaIndex::from_path(&bwt)
        .with_context(|| format!("failed to load BWT from {}", bwt.display()))?;

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    for idx in 0..index.num_strings() {
        let read = interval::extract_string(&index, idx);
        writeln!(out, "{}", alphabet::decode(&read))?;
    }
    Ok(())
}

fn run_info(bwt: PathBuf) -> Result<()> {
    let file =
        File::open(&bwt).with_context(|| format!("failed to open {}", bwt.display()))?;
    let (rle, header) = bwt_io::read_bwt(&mut BufReader::new(file))
        .with_context(|| format!("failed to read {}", bwt.display()))?;
    let index = DnaIndex::from_bwt(rle).context("failed to build FM-index")?;
    let stats = index.stats();

    println!("strings:      {}", header.num_strings);
    println!("symbols:      {}", stats.num_symbols);
    println!("runs:         {}", stats.num_runs);
    println!("avg run len:  {:.3}", stats.avg_run_len);
    println!("large marks:  {}", stats.num_large_marks);
    println!("small marks:  {}", stats.num_small_marks);
    Ok(())
}

/// Read sequences from a file: FASTA records or one sequence per line.
fn read_sequences(path: &PathBuf) -> Result<Vec<Vec<u8>>> {
    let contents = std::fs::read_to_string(path)?;
    let mut sequences = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut fasta = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('>') {
            fasta = true;
            if let Some(seq) = current.take() {
                sequences.push(seq);
            }
            current = Some(Vec::new());
        } else if fasta {
            current
                .get_or_insert_with(Vec::new)
                .extend_from_slice(line.as_bytes());
        } else {
            sequences.push(line.as_bytes().to_vec());
        }
    }
    if let Some(seq) = current.take() {
        sequences.push(seq);
    }
    sequences.retain(|seq| !seq.is_empty());
    Ok(sequences)
}
