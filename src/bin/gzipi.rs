//! gzipi CLI
//!
//! Command-line interface for repacking, indexing and searching
//! block-compressed line archives.
//!
//! Exit codes: 0 success; 1 I/O, codec or format error; 2 usage error;
//! 3 index integrity error. Diagnostics go to stderr; record output goes to
//! stdout unless `-o` is given.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use gzipi::codec::StreamEncoder;
use gzipi::{Codec, Config, GzipiError, LocalStore, RecordFormat, Result, Retriever};

/// gzipi — random access to block-compressed line archives
#[derive(Parser, Debug)]
#[command(name = "gzipi")]
#[command(about = "Repack, index and search block-compressed line archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recompress an archive into bounded members and build its index
    Repack {
        /// Input records (gzip, zstd or plain); '-' or absent for stdin
        #[arg(short = 'f', long)]
        input_file: Option<PathBuf>,

        /// Output archive path
        #[arg(short = 'o', long)]
        output_file: PathBuf,

        /// Output index path
        #[arg(short = 'i', long)]
        index_file: PathBuf,

        /// Output codec; inferred from the output extension by default
        #[arg(long)]
        codec: Option<Codec>,

        /// Records per member
        #[arg(long, default_value_t = 16 * 1024)]
        member_records: usize,

        /// Fail on the first record whose key cannot be extracted
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Build an index for an archive that is already chunked
    Index {
        /// Archive to scan; '-' or absent for stdin
        #[arg(short = 'f', long)]
        input_file: Option<PathBuf>,

        /// Output index path
        #[arg(short = 'i', long)]
        index_file: PathBuf,

        /// Archive codec; sniffed from the input by default
        #[arg(long)]
        codec: Option<Codec>,

        /// Fail on the first record whose key cannot be extracted
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Retrieve the records for a stream of keys
    Retrieve {
        /// Archive path
        #[arg(short = 'f', long)]
        input_file: PathBuf,

        /// Index path
        #[arg(short = 'i', long)]
        index_file: PathBuf,

        /// Keys to retrieve, one per line; '-' or absent for stdin
        #[arg(short = 'k', long)]
        keys_file: Option<PathBuf>,

        /// Output path (compressed if it ends in .gz/.zst); stdout by default
        #[arg(short = 'o', long)]
        output_file: Option<PathBuf>,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Retrieve the record for a single key
    Search {
        /// Archive path
        #[arg(short = 'f', long)]
        input_file: PathBuf,

        /// Index path
        #[arg(short = 'i', long)]
        index_file: PathBuf,

        /// The key to look up
        #[arg(long)]
        key: String,

        /// Output path; stdout by default
        #[arg(short = 'o', long)]
        output_file: Option<PathBuf>,

        #[command(flatten)]
        format: FormatArgs,
    },
}

// =============================================================================
// Record Format Options (shared by all commands)
// =============================================================================

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatKind {
    Json,
    Csv,
    Raw,
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Record format of the archive payload
    #[arg(long, value_enum, default_value_t = FormatKind::Raw)]
    format: FormatKind,

    /// JSON field holding the key (with --format json)
    #[arg(long)]
    field: Option<String>,

    /// CSV key column, 0-based (with --format csv)
    #[arg(long, default_value_t = 0)]
    column: usize,

    /// CSV delimiter (with --format csv)
    #[arg(long, default_value = "|")]
    delimiter: char,
}

impl FormatArgs {
    fn record_format(&self) -> Result<RecordFormat> {
        match self.format {
            FormatKind::Json => {
                let field = self.field.clone().ok_or_else(|| {
                    GzipiError::Config("--format json requires --field".to_string())
                })?;
                Ok(RecordFormat::Json { field })
            }
            FormatKind::Csv => {
                if !self.delimiter.is_ascii() {
                    return Err(GzipiError::Config(
                        "--delimiter must be a single byte".to_string(),
                    ));
                }
                Ok(RecordFormat::Csv { column: self.column, delimiter: self.delimiter as u8 })
            }
            FormatKind::Raw => Ok(RecordFormat::Raw),
        }
    }
}

// =============================================================================
// Entry Point
// =============================================================================

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let store = LocalStore;
    match cli.command {
        Commands::Repack {
            input_file,
            output_file,
            index_file,
            codec,
            member_records,
            strict,
            format,
        } => {
            let config = Config::builder()
                .codec(codec.or_else(|| Codec::from_path(&output_file)).unwrap_or(Codec::Gzip))
                .member_records(member_records)
                .format(format.record_format()?)
                .strict(strict)
                .build();
            let input = open_input(input_file.as_deref())?;
            gzipi::repack_run(&store, input, &output_file, &index_file, &config)?;
            Ok(0)
        }

        Commands::Index { input_file, index_file, codec, strict, format } => {
            let config = Config::builder()
                .format(format.record_format()?)
                .strict(strict)
                .build();
            let (archive, archive_codec) = open_archive_input(input_file.as_deref(), codec)?;
            gzipi::index_run(&store, archive, archive_codec, &index_file, &config)?;
            Ok(0)
        }

        Commands::Retrieve { input_file, index_file, keys_file, output_file, format } => {
            let config = Config::builder().format(format.record_format()?).build();
            let mut retriever = Retriever::open(&store, &input_file, &index_file, &config)?;
            let keys = open_input(keys_file.as_deref())?;

            let stats = with_output(output_file.as_deref(), |out| retriever.retrieve(keys, out))?;
            tracing::info!(
                matched = stats.matched,
                missing = stats.missing,
                codec_errors = stats.codec_errors,
                "retrieve complete"
            );
            Ok(if stats.is_clean() { 0 } else { 1 })
        }

        Commands::Search { input_file, index_file, key, output_file, format } => {
            let config = Config::builder().format(format.record_format()?).build();
            let mut retriever = Retriever::open(&store, &input_file, &index_file, &config)?;

            match retriever.search(key.as_bytes())? {
                Some(record) => {
                    with_output(output_file.as_deref(), |out| {
                        out.write_all(&record)?;
                        Ok(())
                    })?;
                }
                None => tracing::info!(key = %key, "key not found"),
            }
            Ok(0)
        }
    }
}

// =============================================================================
// Stream Helpers
// =============================================================================

/// Open an input path, treating `-` or absence as stdin
fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(p) if p.as_os_str() != "-" => Ok(Box::new(File::open(p)?)),
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

/// Open an archive for frame scanning, resolving its codec.
///
/// Files are sniffed in place; stdin is peeked and rejoined. Uncompressed
/// input cannot be indexed in place.
fn open_archive_input(
    path: Option<&Path>,
    codec: Option<Codec>,
) -> Result<(Box<dyn Read>, Codec)> {
    match path {
        Some(p) if p.as_os_str() != "-" => {
            let mut file = File::open(p)?;
            let sniffed = Codec::sniff(&mut file)?;
            let codec = codec.or(sniffed).or_else(|| Codec::from_path(p)).ok_or_else(|| {
                GzipiError::Codec(format!("{} is not a gzip or zstd archive", p.display()))
            })?;
            Ok((Box::new(file), codec))
        }
        _ => {
            let mut stdin = io::stdin().lock();
            let mut header = [0u8; 4];
            let mut filled = 0;
            while filled < header.len() {
                let n = stdin.read(&mut header[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            let sniffed = Codec::sniff_bytes(&header[..filled]);
            let codec = codec.or(sniffed).ok_or_else(|| {
                GzipiError::Codec("stdin is not a gzip or zstd archive".to_string())
            })?;
            let rejoined = Cursor::new(header[..filled].to_vec()).chain(stdin);
            Ok((Box::new(rejoined), codec))
        }
    }
}

/// Run `f` against the output sink, compressing when the path extension
/// implies a codec
fn with_output<T>(
    path: Option<&Path>,
    f: impl FnOnce(&mut dyn Write) -> Result<T>,
) -> Result<T> {
    match path {
        Some(p) => {
            let file: Box<dyn Write> = Box::new(File::create(p)?);
            match Codec::from_path(p) {
                Some(codec) => {
                    let mut encoder = StreamEncoder::new(file, codec)?;
                    let value = f(&mut encoder)?;
                    encoder.finish()?.flush()?;
                    Ok(value)
                }
                None => {
                    let mut file = file;
                    let value = f(&mut file)?;
                    file.flush()?;
                    Ok(value)
                }
            }
        }
        None => {
            let mut stdout = io::stdout().lock();
            let value = f(&mut stdout)?;
            stdout.flush()?;
            Ok(value)
        }
    }
}
