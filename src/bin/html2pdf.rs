//! CLI binary for edgequake-html2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SessionConfig` and a `SearchPath`, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_html2pdf::{
    convert_file, EngineMessage, ProgressCallback, ResourceStatus, SearchPath, SessionConfig,
    Severity, TranscodeError, TranscodeOutput, TranscodeProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a byte-level bar over the source document plus
/// one log line per resource the engine asked for.
struct CliProgressCallback {
    bar: ProgressBar,
    missing: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Connecting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            missing: AtomicUsize::new(0),
        })
    }
}

impl TranscodeProgressCallback for CliProgressCallback {
    fn on_connected(&self, endpoint: &str) {
        self.bar.set_prefix("Transcoding");
        self.bar.set_message(endpoint.to_string());
    }

    fn on_main_length(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
    }

    fn on_main_read(&self, read: u64) {
        self.bar.set_position(read);
    }

    fn on_resource(&self, uri: &str, status: &ResourceStatus) {
        match status {
            ResourceStatus::Found { origin, bytes, .. } => self.bar.println(format!(
                "  {} {:<40}  {}",
                green("✓"),
                uri,
                dim(&format!("{bytes:>8} bytes  {origin:?}")),
            )),
            ResourceStatus::Missing { reason } => {
                self.missing.fetch_add(1, Ordering::SeqCst);
                self.bar.println(format!("  {} {:<40}  {}", red("✗"), uri, dim(reason)));
            }
        }
    }

    fn on_message(&self, message: &EngineMessage) {
        if message.severity != Severity::Info {
            self.bar
                .println(format!("  {} {}", yellow("!"), message.message));
        }
    }

    fn on_complete(&self, output_bytes: u64) {
        self.bar.finish_and_clear();
        let missing = self.missing.load(Ordering::SeqCst);
        let mark = if missing == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} bytes written  ({} missing resources)",
            mark,
            bold(&output_bytes.to_string()),
            missing
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the input (report.html → report.pdf), resources beside it
  html2pdf report.html

  # Explicit output and resource directories, templates as fallback
  html2pdf site/index.html -o out/index.pdf --resource-dir site --template-dir templates

  # Another engine, engine properties
  html2pdf doc.html --server ctip://localhost:8099/ -P output.pdf.version=1.7

  # Machine-readable summary
  html2pdf doc.html --json > result.json

RESOURCE LOOKUP:
  Every image, stylesheet or font the engine asks for is looked up in
  --resource-dir first, then in --template-dir. References that climb out
  of those directories (../, absolute paths, URLs) are refused. Anything not
  found is reported missing to the engine; the conversion still completes.

ENVIRONMENT VARIABLES:
  CTI_SERVER              Engine address (ctip://host[:port]/)
  CTI_USER                Engine user
  CTI_PASSWORD            Engine password
  HTML2PDF_TEMPLATE_DIR   Fallback resource directory
  RUST_LOG                Override log filter (e.g. edgequake_html2pdf=debug)
"#;

/// Convert HTML documents to PDF through a remote CTIP transcoding engine.
#[derive(Parser, Debug)]
#[command(
    name = "html2pdf",
    version,
    about = "Convert HTML documents to PDF through a remote CTIP transcoding engine",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HTML document to convert.
    input: PathBuf,

    /// Output file. Default: the input with a `.pdf` extension.
    #[arg(short, long, env = "HTML2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Primary resource directory. Default: the input's directory.
    #[arg(long, env = "HTML2PDF_RESOURCE_DIR")]
    resource_dir: Option<PathBuf>,

    /// Fallback resource directory, searched when the primary misses.
    #[arg(long, env = "HTML2PDF_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    /// Engine address.
    #[arg(long, env = "CTI_SERVER", default_value = "ctip://cti.li/")]
    server: String,

    /// Engine user.
    #[arg(long, env = "CTI_USER", default_value = "user")]
    user: String,

    /// Engine password.
    #[arg(long, env = "CTI_PASSWORD", default_value = "kappa", hide_env_values = true)]
    password: String,

    /// Engine property as NAME=VALUE. Repeatable.
    #[arg(short = 'P', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Connect + handshake timeout in seconds.
    #[arg(long, env = "HTML2PDF_CONNECT_TIMEOUT", default_value_t = 30)]
    connect_timeout: u64,

    /// Per read/write timeout once connected, in seconds (0 = none).
    #[arg(long, env = "HTML2PDF_IO_TIMEOUT", default_value_t = 300)]
    io_timeout: u64,

    /// Bytes per DATA frame sent to the engine (1 KiB–1 MiB).
    #[arg(long, env = "HTML2PDF_CHUNK_SIZE", default_value_t = 16 * 1024)]
    chunk_size: usize,

    /// Print the result (TranscodeOutput) as JSON on stdout.
    #[arg(long, env = "HTML2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "HTML2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HTML2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HTML2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; errors still go through.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TranscodeProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let search_path = build_search_path(&cli);
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert_file(&cli.input, &output_path, &search_path, &config)
        .await
        .map_err(|e| {
            let label = failure_label(&e);
            anyhow::Error::new(e).context(label)
        })?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        print_summary(&output, &output_path);
    } else if !cli.quiet {
        eprintln!("   →  {}", bold(&output_path.display().to_string()));
    }

    Ok(())
}

/// Map CLI args to `SessionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SessionConfig> {
    let mut builder = SessionConfig::builder()
        .endpoint(&cli.server)
        .user(&cli.user)
        .password(&cli.password)
        .connect_timeout_secs(cli.connect_timeout)
        .io_timeout_secs(cli.io_timeout)
        .chunk_size(cli.chunk_size);

    for (name, value) in &cli.properties {
        builder = builder.property(name, value);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_search_path(cli: &Cli) -> SearchPath {
    let primary = cli
        .resource_dir
        .clone()
        .unwrap_or_else(|| input_dir(&cli.input));
    match &cli.template_dir {
        Some(fallback) => SearchPath::new(primary).with_fallback(fallback),
        None => SearchPath::new(primary),
    }
}

fn input_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Parse a `-P NAME=VALUE` argument.
fn parse_property(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty property name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn failure_label(e: &TranscodeError) -> &'static str {
    if e.is_connection_error() {
        "Connection failed"
    } else if e.is_permission_error() {
        "Permission denied"
    } else {
        "Conversion failed"
    }
}

fn print_summary(output: &TranscodeOutput, path: &Path) {
    for record in &output.resources {
        match &record.status {
            ResourceStatus::Found { path, origin, .. } => eprintln!(
                "  {} {}  {}",
                green("✓"),
                record.uri,
                dim(&format!("{origin:?}: {}", path.display()))
            ),
            ResourceStatus::Missing { reason } => {
                eprintln!("  {} {}  {}", red("✗"), record.uri, dim(reason))
            }
        }
    }
    for message in output.messages.iter().filter(|m| m.severity != Severity::Info) {
        eprintln!("  {} {}", yellow("!"), message.message);
    }
    let stats = &output.stats;
    eprintln!(
        "{}  {} bytes  {} found / {} missing  {}ms  →  {}",
        if stats.resources_missing == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.output_bytes,
        stats.resources_found,
        stats.resources_missing,
        stats.duration_ms,
        bold(&path.display().to_string()),
    );
}
