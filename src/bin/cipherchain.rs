#![forbid(unsafe_code)]
//! Command-line front end for CipherChain

use cipherchain::blockchain::{ChainVerdict, Ledger};
use cipherchain::cli::{format_timestamp, load_ledger_from_config, short_hash};
use cipherchain::config::Config;
use cipherchain::crypto::{ImageEncryptor, PayloadProducer, RawFileProducer};
use cipherchain::ingest::ingest_sources;
use cipherchain::persistence::StoredBlock;
use cipherchain::sources::enumerate_sources;
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = cipherchain::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypts every image in a folder and appends it to the ledger
    Ingest {
        /// Folder to scan (defaults to ingest.source_dir)
        dir: Option<PathBuf>,
        /// Number of encryption workers (defaults to ingest.workers)
        #[arg(long)]
        workers: Option<usize>,
        /// Store file bytes without encrypting them
        #[arg(long)]
        raw: bool,
    },
    /// Encrypts a single file and appends it
    Add {
        file: PathBuf,
        #[arg(long)]
        raw: bool,
    },
    /// Re-derives every hash and link in the stored chain
    Verify,
    /// Lists blocks, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Shows one block, optionally decrypting its payload to a file
    Show {
        index: u64,
        #[arg(long)]
        decrypt_to: Option<PathBuf>,
    },
    /// Writes the whole chain as JSON
    Export { out: PathBuf },
    /// Creates the image key file if it does not exist and prints its path
    Keygen,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let (config, ledger) = load_ledger_from_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dir, workers, raw } => ingest(&config, &ledger, dir, workers, raw),
        Commands::Add { file, raw } => add(&config, &ledger, &file, raw),
        Commands::Verify => verify(&ledger),
        Commands::History { limit } => history(&ledger, limit),
        Commands::Show { index, decrypt_to } => show(&config, &ledger, index, decrypt_to.as_deref()),
        Commands::Export { out } => export(&ledger, &out),
        Commands::Keygen => {
            ImageEncryptor::load_or_generate(&config.crypto.key_file)?;
            println!("🔑 Image key: {}", config.crypto.key_file.display().to_string().bright_yellow());
            Ok(())
        }
    }
}

fn producer(config: &Config, raw: bool) -> Result<Box<dyn PayloadProducer>, Box<dyn std::error::Error>> {
    if raw {
        Ok(Box::new(RawFileProducer))
    } else {
        Ok(Box::new(ImageEncryptor::load_or_generate(&config.crypto.key_file)?))
    }
}

fn ingest(
    config: &Config,
    ledger: &Ledger,
    dir: Option<PathBuf>,
    workers: Option<usize>,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = dir.unwrap_or_else(|| config.ingest.source_dir.clone());
    let workers = workers.unwrap_or(config.ingest.workers);
    let sources = enumerate_sources(&dir, &config.ingest.extensions)?;

    if sources.is_empty() {
        println!("{}", format!("📭 No images found in {}", dir.display()).yellow());
        return Ok(());
    }

    let producer = producer(config, raw)?;
    println!("{}", format!("🔐 Sealing {} images from {}", sources.len(), dir.display()).bright_cyan());

    let bar = ProgressBar::new(sources.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?);
    let report = ingest_sources(ledger, producer.as_ref(), &sources, workers, |outcome| {
        if let Some(name) = outcome.source.file_name() {
            bar.set_message(name.to_string_lossy().into_owned());
        }
        bar.inc(1);
    })?;
    bar.finish_and_clear();

    for block in report.appended() {
        println!(
            "{} #{} {}",
            "✅".green(),
            block.index(),
            short_hash(block.hash()).bright_white()
        );
    }
    for (source, error) in report.failures() {
        println!("{} {}: {}", "❌".red(), source.display(), error.to_string().red());
    }
    println!(
        "{}",
        format!(
            "📦 Appended {} · Failed {} · Height {}",
            report.appended_count(),
            report.failed_count(),
            ledger.height()
        )
        .bright_blue()
    );

    if !report.is_complete_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn add(config: &Config, ledger: &Ledger, file: &Path, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    let payload = producer(config, raw)?.produce(file)?;
    let block = ledger.add_block(payload)?;
    println!(
        "{} Block #{} sealed: {}",
        "✅".green(),
        block.index(),
        block.hash().bright_white()
    );
    Ok(())
}

fn verify(ledger: &Ledger) -> Result<(), Box<dyn std::error::Error>> {
    match ledger.verify_chain()? {
        ChainVerdict::Valid { length } => {
            println!("{}", format!("✅ Chain valid ({} blocks)", length).green().bold());
            Ok(())
        }
        ChainVerdict::Invalid(violation) => {
            eprintln!("{}", "❌ Chain INVALID".red().bold());
            eprintln!("   {}", violation.to_string().red());
            std::process::exit(2);
        }
    }
}

fn history(ledger: &Ledger, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let chain = ledger.get_chain()?;
    if chain.is_empty() {
        println!("{}", "📭 The ledger is empty.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Index", "Hash", "Previous", "Payload", "Sealed at"]
                .into_iter()
                .map(|h| Cell::new(h).fg(TableColor::Cyan).add_attribute(Attribute::Bold)),
        );

    for block in chain.iter().rev().take(limit.unwrap_or(usize::MAX)) {
        table.add_row(vec![
            Cell::new(format!("#{}", block.index())).fg(TableColor::White),
            Cell::new(short_hash(block.hash())).fg(TableColor::Green),
            Cell::new(short_hash(block.previous_hash())).fg(TableColor::Grey),
            Cell::new(format!("{} bytes", block.payload().len())),
            Cell::new(format_timestamp(block.timestamp())).fg(TableColor::Grey),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn show(
    config: &Config,
    ledger: &Ledger,
    index: u64,
    decrypt_to: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let block = ledger
        .get_block(index)?
        .ok_or(cipherchain::ChainError::BlockNotFound(index))?;

    println!("{} {}", "Index:".bright_cyan(), block.index());
    println!("{} {}", "Hash:".bright_cyan(), block.hash());
    println!("{} {}", "Previous:".bright_cyan(), block.previous_hash());
    println!("{} {}", "Sealed at:".bright_cyan(), format_timestamp(block.timestamp()));
    println!("{} {} bytes", "Payload:".bright_cyan(), block.payload().len());
    if !block.has_valid_hash() {
        println!("{}", "⚠️  Stored hash does not match block contents".red());
    }

    if let Some(out) = decrypt_to {
        let encryptor = ImageEncryptor::load(&config.crypto.key_file)?;
        let image = encryptor.decrypt(block.payload())?;
        std::fs::write(out, image)?;
        println!("{}", format!("🖼️  Decrypted image written to {}", out.display()).green());
    }
    Ok(())
}

fn export(ledger: &Ledger, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<StoredBlock> = ledger.get_chain()?.iter().map(StoredBlock::from).collect();
    std::fs::write(out, serde_json::to_string_pretty(&records)?)?;
    println!("{}", format!("📤 Exported {} blocks to {}", records.len(), out.display()).green());
    Ok(())
}
