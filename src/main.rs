use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::error;

use bigzip::archive::Archive;
use bigzip::codec::CodecId;
use bigzip::config::{ArchiveConfig, ErrorPolicy, Granularity};
use bigzip::iter::ResumePoint;
use bigzip::{ArchiveError, ContentHash, RecoveryOutcome};

#[derive(Parser)]
#[command(name = "bigzip", version, about = "Append-only BIG archive CLI")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// JSON config file; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Codec: zstd (default), lz4, brotli, lzma, none
    #[arg(short, long, global = true)]
    codec: Option<String>,
    /// Compression level (zstd 1-19; brotli 0-11; ignored for lz4/lzma)
    #[arg(short, long, global = true)]
    level: Option<i32>,
    /// Skip files larger than this many bytes
    #[arg(long, global = true)]
    max_file_size: Option<u64>,
    /// Commit every stored file in its own session
    #[arg(long, global = true)]
    per_file: bool,
    /// Stop a folder append at the first unreadable file
    #[arg(long, global = true)]
    abort_on_error: bool,
    /// Owner string for new index/log headers
    #[arg(long, global = true)]
    owner: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one or more folders
    Add {
        archive: PathBuf,
        #[arg(required = true, num_args = 1..)]
        folders: Vec<PathBuf>,
        /// Prefix stripped from stored paths (default: first folder)
        #[arg(long)]
        base: Option<PathBuf>,
    },
    /// Append a single file in its own session
    AddFile {
        archive: PathBuf,
        file:    PathBuf,
        #[arg(long)]
        base: Option<PathBuf>,
    },
    /// Extract one entry to a file
    Extract {
        archive: PathBuf,
        path:    String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print one entry as text
    Cat {
        archive: PathBuf,
        path:    String,
    },
    /// List index entries
    List {
        archive: PathBuf,
    },
    /// Find stored paths by SHA-1
    Find {
        archive: PathBuf,
        hash:    String,
        /// Print every match, not just the first
        #[arg(short, long)]
        all: bool,
    },
    /// Roll back an interrupted write session
    Recover {
        archive: PathBuf,
    },
    /// Walk the data file by signatures, without the index
    Scan {
        archive: PathBuf,
    },
    /// Extract every entry below a directory
    Unpack {
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Index byte offset printed by a previous run
        #[arg(long, requires = "files_read")]
        resume_offset: Option<u64>,
        #[arg(long)]
        files_read: Option<u64>,
        /// Entries to skip before extracting
        #[arg(long, default_value = "0")]
        skip: u64,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            match e.downcast_ref::<ArchiveError>() {
                Some(ae) if ae.is_fatal() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli.opts)?;

    match cli.command {

        // ── Add ──────────────────────────────────────────────────────────────
        Commands::Add { archive, folders, base } => {
            let mut ar = Archive::open_with(&archive, config)?;
            if let Some(base) = base {
                ar.set_base_path(base);
            }
            for folder in &folders {
                let report = ar.append_folder(folder)?;
                println!(
                    "  added   {} ({} stored, {} skipped, {} B)",
                    folder.display(),
                    report.stored.len(),
                    report.skipped.len(),
                    report.stored_bytes()
                );
                for skipped in &report.skipped {
                    println!("  skipped {}  {}", skipped.path.display(), skipped.reason);
                }
            }
            ar.close()?;
        }

        // ── AddFile ──────────────────────────────────────────────────────────
        Commands::AddFile { archive, file, base } => {
            let ar = Archive::open_with(&archive, config)?;
            let entry = ar.append_file(&file, base.as_deref())?;
            println!("{:015} {} {}", entry.offset, entry.hash, entry.path);
            ar.close()?;
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { archive, path, output } => {
            let ar = Archive::open_with(&archive, config)?;
            if ar.extract_to_file(&path, &output)? {
                println!("Extracted: {} -> {}", path, output.display());
            } else {
                println!("Not found: {path}");
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { archive, path } => {
            let ar = Archive::open_with(&archive, config)?;
            match ar.extract_text(&path)? {
                Some(text) => print!("{text}"),
                None => println!("Not found: {path}"),
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive } => {
            let ar = Archive::open_with(&archive, config)?;
            println!("Archive: {}", archive.display());
            println!("{:<15} {:<40} Path", "Offset", "SHA-1");
            for line in ar.list()? {
                println!("{:015} {} {}", line.offset, line.hash, line.path);
            }
        }

        // ── Find ─────────────────────────────────────────────────────────────
        Commands::Find { archive, hash, all } => {
            let ar = Archive::open_with(&archive, config)?;
            let hash: ContentHash = hash.parse()?;
            if all {
                let found = ar.find_all_by_hash(&hash)?;
                if found.is_empty() {
                    println!("No entry with hash {hash}");
                }
                for path in found {
                    println!("{path}");
                }
            } else {
                match ar.find_by_hash(&hash)? {
                    Some(path) => println!("{path}"),
                    None => println!("No entry with hash {hash}"),
                }
            }
        }

        // ── Recover ──────────────────────────────────────────────────────────
        Commands::Recover { archive } => {
            let ar = Archive::open_with(&archive, config)?;
            let outcome = if ar.open_recovery().was_restored() {
                ar.open_recovery().clone()
            } else {
                ar.recover()?
            };
            match outcome {
                RecoveryOutcome::Clean { position } => {
                    println!("Archive is consistent at offset {position}");
                }
                RecoveryOutcome::Restored { position, dropped_bytes, dropped_index_lines } => {
                    println!(
                        "Restored to offset {position}: dropped {dropped_bytes} B and {dropped_index_lines} index line(s)"
                    );
                }
            }
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { archive } => {
            let ar = Archive::open_with(&archive, config)?;
            let report = ar.scan()?;
            println!("{}", report.summary());
            for entry in &report.entries {
                match &entry.header {
                    Some(h) => println!(
                        "  {:015}  {:?}  size={}  name={}",
                        entry.offset, entry.health, h.orig_size, h.name
                    ),
                    None => println!("  {:015}  {:?}", entry.offset, entry.health),
                }
            }
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { archive, output_dir, resume_offset, files_read, skip } => {
            let ar = Archive::open_with(&archive, config)?;
            let mut entries = match resume_offset {
                Some(index_offset) => ar.entries_from(ResumePoint {
                    index_offset,
                    files_read: files_read.unwrap_or(0),
                })?,
                None => ar.entries()?,
            };
            entries.skip_entries(skip)?;
            std::fs::create_dir_all(&output_dir)?;
            let mut written = 0u64;
            for extracted in &mut entries {
                let target = extracted?.write_into(&output_dir)?;
                println!("  unpacked {}", target.display());
                written += 1;
            }
            let point = entries.resume_point();
            println!(
                "Unpacked {} file(s) to {} (resume: --resume-offset {} --files-read {})",
                written,
                output_dir.display(),
                point.index_offset,
                point.files_read
            );
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn load_config(opts: &GlobalOpts) -> Result<ArchiveConfig, Box<dyn std::error::Error>> {
    let mut config = match &opts.config {
        Some(path) => ArchiveConfig::from_file(path)?,
        None => ArchiveConfig::default(),
    };
    if let Some(name) = &opts.codec {
        config.codec = parse_codec(name);
    }
    if let Some(level) = opts.level {
        config.level = level;
    }
    if let Some(limit) = opts.max_file_size {
        config.max_file_size = limit;
    }
    if opts.per_file {
        config.granularity = Granularity::PerFile;
    }
    if opts.abort_on_error {
        config.on_error = ErrorPolicy::Abort;
    }
    if let Some(owner) = &opts.owner {
        config.owner = owner.clone();
    }
    Ok(config)
}

fn parse_codec(s: &str) -> CodecId {
    CodecId::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown codec '{}', defaulting to zstd", s);
        CodecId::Zstd
    })
}
