use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vlindex_core::{DescriptorMatcher, DynamicIndex, Index, IndexResult, IndexType, MatchingResult};

mod config;
mod input;

use config::Config;

#[derive(Parser)]
#[command(name = "vlindex", about = "Biometric descriptor index tool")]
struct Cli {
    /// TOML configuration file (defaults to $VLINDEX_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new index, optionally filled from a JSON batch
    Create {
        /// Index file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Layout to write: dynamic or dense
        #[arg(short, long)]
        format: Option<IndexType>,
        /// JSON array of descriptors
        #[arg(short, long)]
        descriptors: Option<PathBuf>,
    },
    /// Append a JSON batch to a dynamic index in place
    Append {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long)]
        descriptors: PathBuf,
    },
    /// Find the nearest neighbours of a JSON descriptor
    Search {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long)]
        query: PathBuf,
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },
    /// Re-save an index in another layout
    Convert {
        #[arg(short, long)]
        index: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        format: IndexType,
    },
    /// Show an index file's header
    Info {
        #[arg(short, long)]
        index: PathBuf,
    },
    /// Match one descriptor against a JSON batch of candidates
    Match {
        #[arg(short, long)]
        reference: PathBuf,
        #[arg(short, long)]
        candidates: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn create(config: &Config, output: &Path, format: Option<IndexType>, descriptors: Option<&Path>) -> Result<()> {
    let spec = config.spec()?;
    let index = DynamicIndex::new(spec);
    if let Some(path) = descriptors {
        index.append_batch(&input::read_batch(path, &spec)?)?;
    }
    let format = format.unwrap_or(config.default_format);
    index
        .save(output, format)
        .with_context(|| format!("failed to create {}", output.display()))?;
    tracing::info!(path = %output.display(), %format, count = index.count(), "index created");
    println!("Created {format} index with {} descriptors: {}", index.count(), output.display());
    Ok(())
}

fn append(index_path: &Path, descriptors: &Path) -> Result<()> {
    let index = DynamicIndex::load(index_path)?;
    let batch = input::read_batch(descriptors, index.spec())?;
    index.append_batch(&batch)?;
    index.save(index_path, IndexType::Dynamic)?;
    println!("Appended {} descriptors, index now holds {}", batch.len(), index.count());
    Ok(())
}

fn search(config: &Config, index_path: &Path, query: &Path, max_count: Option<usize>) -> Result<Vec<IndexResult>> {
    let index = vlindex_core::load(index_path)?;
    let query = input::read_descriptor(query, index.spec())?;
    Ok(index.search(&query, max_count.unwrap_or(config.max_count))?)
}

fn convert(index_path: &Path, output: &Path, format: IndexType) -> Result<()> {
    let index = vlindex_core::load(index_path)?;
    index.save(output, format)?;
    println!("Converted {} ({}) to {format}: {}", index_path.display(), index.kind(), output.display());
    Ok(())
}

fn match_descriptors(config: &Config, reference: &Path, candidates: &Path) -> Result<Vec<MatchingResult>> {
    let spec = config.spec()?;
    let matcher = DescriptorMatcher::new(spec);
    let reference = input::read_descriptor(reference, &spec)?;
    let candidates = input::read_batch(candidates, &spec)?;
    Ok(matcher.match_batch(&reference, &candidates)?)
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Create {
            output,
            format,
            descriptors,
        } => create(&config, &output, format, descriptors.as_deref()),
        Commands::Append { index, descriptors } => append(&index, &descriptors),
        Commands::Search {
            index,
            query,
            max_count,
        } => print_json(&search(&config, &index, &query, max_count)?),
        Commands::Convert {
            index,
            output,
            format,
        } => convert(&index, &output, format),
        Commands::Info { index } => print_json(&vlindex_core::read_info(&index)?),
        Commands::Match {
            reference,
            candidates,
        } => print_json(&match_descriptors(&config, &reference, &candidates)?),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<vlindex_core::Error>() {
                Some(core) => match serde_json::to_string(&core.info()) {
                    Ok(info) => eprintln!("{info}"),
                    Err(_) => eprintln!("error: {err:#}"),
                },
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
