//! jsonidx - build and query secondary indexes over a JSON array file.
//!
//! Usage:
//!   jsonidx build   data.json data.idx --field id --field name
//!   jsonidx get     data.json data.idx 42
//!   jsonidx query   data.json data.idx --where id=42 --where name=bob
//!   jsonidx extract data.json
//!
//! Matching elements are printed one JSON document per line. Fields given
//! to `build` are remembered in the index directory, so later commands can
//! omit `--field`.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jsonidx::{IndexConfig, IndexError, JsonIndex, ResultView};

#[derive(Parser)]
#[command(name = "jsonidx")]
#[command(about = "Secondary indexes over huge JSON array files")]
#[command(version)]
struct Cli {
    /// Bytes read per chunk while scanning (default: sized from free memory)
    #[arg(long, global = true, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Capacity of the read window used when fetching results
    #[arg(long, global = true, value_name = "BYTES")]
    window_size: Option<usize>,

    /// Pin the hash seed of a newly created index
    #[arg(long, global = true)]
    seed: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index of a data file
    Build {
        data: PathBuf,
        index_dir: PathBuf,
        /// Field to index; the first one is the default lookup field
        #[arg(long = "field", short = 'f', required = true)]
        fields: Vec<String>,
    },
    /// Print the elements whose default field equals KEY
    Get {
        data: PathBuf,
        index_dir: PathBuf,
        key: String,
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },
    /// Print the elements matching any NAME=VALUE criterion
    Query {
        data: PathBuf,
        index_dir: PathBuf,
        #[arg(long = "where", short = 'w', value_name = "NAME=VALUE", value_parser = parse_criterion, required = true)]
        criteria: Vec<(String, String)>,
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },
    /// Print every top-level element of a data file
    Extract { data: PathBuf },
}

fn parse_criterion(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("jsonidx=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    // Errors are reported with the stable code of the underlying IndexError.
    Ok(match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<IndexError>())
                .map_or("ERROR", IndexError::code);
            eprintln!("{}: {:#}", code, e);
            ExitCode::FAILURE
        }
    })
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Build {
            data,
            index_dir,
            fields,
        } => {
            let config = config_for(&cli, index_dir, fields)?;
            config
                .write_to(index_dir)
                .with_context(|| format!("writing config to {}", index_dir.display()))?;
            let mut index = JsonIndex::new(data, index_dir, config)?;
            index
                .create()
                .with_context(|| format!("building index for {}", data.display()))?;
            if let Some(meta) = index.meta() {
                info!("{} elements, ~{} bytes of index", meta.total, meta.size);
            }
            index.close()?;
        }
        Commands::Get {
            data,
            index_dir,
            key,
            fields,
        } => {
            let index = open(&cli, data, index_dir, fields)?;
            print_view(&index.get_entry(key)?)?;
            index.close()?;
        }
        Commands::Query {
            data,
            index_dir,
            criteria,
            fields,
        } => {
            let index = open(&cli, data, index_dir, fields)?;
            let criteria = criteria.iter().map(|(name, value)| (name.as_str(), value.as_bytes()));
            print_view(&index.query(criteria)?)?;
            index.close()?;
        }
        Commands::Extract { data } => {
            let chunk_size = cli.chunk_size.unwrap_or(jsonidx::config::DEFAULT_PARSE_BUFFER_SIZE);
            let file = std::fs::File::open(data)
                .with_context(|| format!("opening {}", data.display()))?;
            let mut out = BufWriter::new(io::stdout().lock());
            for element in jsonidx::Elements::new(file, chunk_size) {
                out.write_all(&element?)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
    }

    Ok(())
}

/// Build the effective config: explicit fields win, then the config saved
/// in the index directory.
fn config_for(cli: &Cli, index_dir: &Path, fields: &[String]) -> anyhow::Result<IndexConfig> {
    let mut config = if fields.is_empty() {
        match IndexConfig::read_from(index_dir)? {
            Some(saved) => saved,
            None => bail!(
                "no --field given and no saved config in {}",
                index_dir.display()
            ),
        }
    } else if cli.chunk_size.is_none() {
        IndexConfig::auto_tuned(fields.iter().cloned())
    } else {
        IndexConfig::new(fields.iter().cloned())
    };

    if let Some(size) = cli.chunk_size {
        config = config.with_parse_buffer_size(size);
    }
    if let Some(size) = cli.window_size {
        config = config.with_read_buffer_size(size);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

fn open(cli: &Cli, data: &Path, index_dir: &Path, fields: &[String]) -> anyhow::Result<JsonIndex> {
    let config = config_for(cli, index_dir, fields)?;
    let mut index = JsonIndex::new(data, index_dir, config)?;
    index
        .load()
        .with_context(|| format!("loading index {}", index_dir.display()))?;
    Ok(index)
}

fn print_view(view: &ResultView<'_>) -> anyhow::Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    let mut skipped = 0;
    for element in view {
        match element {
            Some(value) => {
                serde_json::to_writer(&mut out, &value)?;
                out.write_all(b"\n")?;
            }
            None => skipped += 1,
        }
    }
    out.flush()?;
    if skipped > 0 {
        warn!("{} of {} matches could not be read", skipped, view.len());
    }
    Ok(())
}
