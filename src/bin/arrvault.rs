//! arrvault CLI - Password-protected backups of Sonarr/Radarr credentials
//!
//! Exports the instances in a JSON credential store to an encrypted backup
//! file, and imports such a backup back into a store.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::process;

use tracing_subscriber::EnvFilter;

use arrvault::file_ops::{self, ImportSummary};
use arrvault::kdf::DEFAULT_ITERATIONS;
use arrvault::passphrase::{
    ConfirmingPassphraseReader, PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader,
};
use arrvault::{BackupConfig, BackupEngine, BackupError, JsonFileStore};

const LOG_ENV: &str = "ARRVAULT_LOG";

#[derive(Parser)]
#[command(name = "arrvault")]
#[command(version)]
#[command(
    about = "Password-protected backup and restore of Sonarr/Radarr instances.",
    long_about = None
)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// PBKDF2 iteration count; a backup can only be imported with the count it was exported with
    #[arg(
        long,
        global = true,
        env = "ARRVAULT_KDF_ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..),
        hide = true
    )]
    kdf_iterations: u32,

    /// Lowest iteration count an export accepts
    #[arg(
        long,
        global = true,
        env = "ARRVAULT_MIN_EXPORT_KDF_ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS,
        hide = true
    )]
    min_export_kdf_iterations: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every instance in the store to an encrypted backup
    #[command(alias = "e")]
    Export {
        /// Path to the JSON credential store
        #[arg(short, long, value_name = "FILE", env = "ARRVAULT_STORE")]
        store: PathBuf,

        /// Path to the backup file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Write the backup as a single line of text instead of binary
        #[arg(long)]
        armor: bool,
    },

    /// Import an encrypted backup into the store
    #[command(alias = "i")]
    Import {
        /// Path to the backup file (binary or armored)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the JSON credential store
        #[arg(short, long, value_name = "FILE", env = "ARRVAULT_STORE")]
        store: PathBuf,

        /// Report what would change without touching the store
        #[arg(long)]
        dry_run: bool,

        /// Accept version 1 backups, which carry no integrity protection
        #[arg(long, env = "ARRVAULT_ALLOW_LEGACY")]
        allow_legacy: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = BackupConfig::default()
        .with_kdf_iterations(cli.kdf_iterations)
        .with_min_export_kdf_iterations(cli.min_export_kdf_iterations);

    let result = match cli.command {
        Commands::Export {
            store,
            output,
            armor,
        } => {
            let engine = BackupEngine::new(config);
            let mut reader = get_passphrase_reader(cli.passphrase_stdin, true);
            file_ops::export_to_file(
                &JsonFileStore::new(store),
                &output,
                &mut *reader,
                &engine,
                armor,
            )
        }
        Commands::Import {
            input,
            store,
            dry_run,
            allow_legacy,
        } => {
            let engine = BackupEngine::new(config.with_legacy_v1(allow_legacy));
            let mut reader = get_passphrase_reader(cli.passphrase_stdin, false);
            file_ops::import_from_file(
                &input,
                &mut JsonFileStore::new(store),
                &mut *reader,
                &engine,
                dry_run,
            )
            .map(|summary| print_summary(&summary))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", describe(&e));
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn get_passphrase_reader(use_stdin: bool, confirm: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else if confirm {
        Box::new(ConfirmingPassphraseReader::terminal())
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

fn print_summary(summary: &ImportSummary) {
    let verb = if summary.applied {
        "Imported"
    } else {
        "Dry run"
    };
    println!(
        "{}: {} created, {} overwritten",
        verb,
        summary.created.len(),
        summary.overwritten.len()
    );
    for id in &summary.created {
        println!("  create    {}", id);
    }
    for id in &summary.overwritten {
        println!("  overwrite {}", id);
    }
}

/// The error message followed by each distinct message in its source chain.
fn describe(err: &BackupError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
