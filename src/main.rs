//! CLI entry point for `mailedrm`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailedrm::config::Config;
use mailedrm::convert::{self, ConversionReport, ExportOptions, FailurePolicy};
use mailedrm::export::hash::HashAlgorithm;

#[derive(Parser)]
#[command(
    name = "mailedrm",
    version,
    about = "Convert mbox mail archives into EDRM XML loadfiles"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an mbox file or mail folder tree into an EDRM loadfile
    Convert {
        /// mbox file, or directory of mbox files (Thunderbird layout supported)
        archive: PathBuf,
        /// Output directory; must not exist yet
        output: PathBuf,
        /// Fail if any item cannot be extracted
        #[arg(long)]
        strict: bool,
        /// Digest for native files
        #[arg(long, value_name = "ALGORITHM")]
        hash: Option<HashAlgorithm>,
        /// Put native files in this subdirectory of the output directory
        #[arg(long, value_name = "DIR")]
        natives_dir: Option<String>,
        /// Print the conversion report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailedrm::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Convert {
            archive,
            output,
            strict,
            hash,
            natives_dir,
            json,
        } => {
            let mut options = ExportOptions::from_config(&config);
            if strict {
                options.failure_policy = FailurePolicy::Strict;
            }
            if let Some(hash) = hash {
                options.hash_algorithm = hash;
            }
            if natives_dir.is_some() {
                options.natives_dir = natives_dir;
            }
            cmd_convert(&archive, &output, &options, json)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailedrm::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailedrm.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Run one conversion with a spinner, then print the summary.
fn cmd_convert(
    archive: &Path,
    output: &Path,
    options: &ExportOptions,
    json: bool,
) -> anyhow::Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} ({elapsed})")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Converting");

    let start = Instant::now();
    let result = convert::convert_with(
        archive,
        output,
        options,
        Some(&|documents: u64| pb.set_message(format!("Converting: {documents} documents"))),
    );
    pb.finish_and_clear();

    let report = result.map_err(|e| anyhow::anyhow!("{}: {e}", archive.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, start.elapsed());
    }

    Ok(())
}

fn print_report(report: &ConversionReport, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  Conversion complete:");
    println!("  {:<25} {}", "Documents", report.documents);
    println!("  {:<25} {}", "Messages", report.messages);
    println!("  {:<25} {}", "Attachments", report.files);
    println!("  {:<25} {}", "Relationships", report.relationships);
    println!(
        "  {:<25} {} ({})",
        "Native files",
        report.natives_written,
        format_size(report.bytes_written, BINARY)
    );
    println!("  {:<25} {}", "Failures", report.failures.len());
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);
    println!("  {:<25} {}", "Loadfile", report.loadfile.display());

    if !report.failures.is_empty() {
        println!();
        println!("  Not extracted:");
        for failure in &report.failures {
            println!("    {}: {}", failure.location, failure.reason);
        }
    }
    println!();
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailedrm", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
