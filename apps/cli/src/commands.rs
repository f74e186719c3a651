//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use errbit_core::{
    Delivery, Errbit, ErrorDetails, ErrorRecord, HttpWriter, NotifierConfig, NotifyOptions,
    RequestContext, SocketWriter, Vars, WriterKind,
};
use errbit_errors::capture_backtrace;
use errbit_notice::{Notice, NoticeOptions};
use errbit_shared::{config_file_path, init_config, load_config, load_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// errbit — send error notices to an Errbit/Airbrake server.
#[derive(Parser)]
#[command(
    name = "errbit",
    version,
    about = "Send test notices to an Errbit server and inspect notice XML.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.errbit/errbit.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build a notice and deliver it.
    Notify {
        #[command(flatten)]
        record: RecordArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Transport: socket or http (defaults to the configured writer).
        #[arg(long)]
        writer: Option<WriterKind>,
    },

    /// Print the notice XML without sending it.
    Render {
        #[command(flatten)]
        record: RecordArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Severity of the notice to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum RecordKind {
    Notice,
    Warning,
    #[default]
    Error,
    Fatal,
}

/// What to report.
#[derive(Args, Debug)]
pub(crate) struct RecordArgs {
    /// Error message.
    #[arg(short, long)]
    pub message: String,

    /// Severity, ignored when --class is given.
    #[arg(long, value_enum, default_value_t = RecordKind::Error)]
    pub kind: RecordKind,

    /// Report as an exception of this type instead.
    #[arg(long)]
    pub class: Option<String>,

    /// Source file of the error site.
    #[arg(long, default_value = "")]
    pub file: String,

    /// Line of the error site.
    #[arg(long, default_value_t = 0)]
    pub line: u32,

    /// Request parameter, `KEY=VALUE` (repeatable).
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Request URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Attach the CLI's own backtrace.
    #[arg(long)]
    pub backtrace: bool,
}

/// Where to send it. Overrides the config file.
#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    /// Project API key.
    #[arg(long, env = "ERRBIT_API_KEY")]
    pub api_key: Option<String>,

    /// Errbit host.
    #[arg(long, env = "ERRBIT_HOST")]
    pub host: Option<String>,

    /// Errbit port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Use TLS.
    #[arg(long)]
    pub secure: bool,

    /// Fire-and-forget mode (UDP for the socket writer).
    #[arg(long = "async")]
    pub async_mode: bool,

    /// Environment name.
    #[arg(long)]
    pub environment: Option<String>,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

impl RecordArgs {
    fn to_record(&self) -> ErrorRecord {
        let backtrace = if self.backtrace {
            capture_backtrace()
        } else {
            Vec::new()
        };

        if let Some(class) = &self.class {
            let details = ErrorDetails::new(&self.message)
                .at(&self.file, self.line)
                .with_backtrace(backtrace);
            return ErrorRecord::exception(class, details);
        }

        let record = match self.kind {
            RecordKind::Notice => ErrorRecord::notice(&self.message, self.line, &self.file),
            RecordKind::Warning => ErrorRecord::warning(&self.message, self.line, &self.file),
            RecordKind::Error => ErrorRecord::error(&self.message, self.line, &self.file),
            RecordKind::Fatal => ErrorRecord::fatal(&self.message, self.line, &self.file),
        };
        record.with_backtrace(backtrace)
    }

    fn to_request(&self) -> RequestContext {
        let mut request = RequestContext::new();
        request.url = self.url.clone();
        if !self.params.is_empty() {
            request.parameters = Some(self.params.iter().cloned().collect::<Vars>());
        }
        request
    }
}

impl TargetArgs {
    fn to_config(&self) -> NotifierConfig {
        NotifierConfig {
            api_key: self.api_key.clone(),
            host: self.host.clone(),
            port: self.port,
            secure: self.secure.then_some(true),
            async_mode: self.async_mode.then_some(true),
            environment_name: self.environment.clone(),
            ..NotifierConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "errbit=info",
        1 => "errbit=debug",
        _ => "errbit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Notify {
            record,
            target,
            writer,
        } => cmd_notify(config_path, &record, &target, writer).await,
        Command::Render { record, target } => cmd_render(config_path, &record, &target),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// File config (explicit path, else the default location) with CLI
/// overrides on top.
fn effective_config(path: Option<&Path>, target: &TargetArgs) -> Result<NotifierConfig> {
    let file = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(file.merged(&target.to_config()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_notify(
    config_path: Option<&Path>,
    record_args: &RecordArgs,
    target: &TargetArgs,
    writer: Option<WriterKind>,
) -> Result<()> {
    let config = effective_config(config_path, target)?;
    let resolved = config.resolve()?;

    let mut client = Errbit::new(config);
    match writer.unwrap_or(resolved.default_writer) {
        WriterKind::Socket => client.set_writer(Arc::new(SocketWriter::new())),
        WriterKind::Http => client.set_writer(Arc::new(HttpWriter::new()?)),
    };
    client.on_notify(|record, config| {
        info!(class = %record.class_name(), host = %config.host, port = config.port, "notice written");
    });

    let record = record_args.to_record();
    let options = NotifyOptions::default().with_request(record_args.to_request());
    let delivery = client
        .notify(&record, options)
        .await
        .wrap_err("failed to deliver notice")?;

    match delivery {
        Delivery::Skipped => println!("Skipped: {} matches a skip rule", record.type_name()),
        Delivery::Discarded => println!(
            "Sent {} to {}:{} (socket writer reports no response)",
            record, resolved.host, resolved.port
        ),
        Delivery::Response(response) => print_response(response).await?,
        Delivery::Pending(handle) => {
            let response = handle
                .await
                .map_err(|e| eyre!("delivery task failed: {e}"))??;
            print_response(response).await?;
        }
    }

    Ok(())
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body = response
        .text()
        .await
        .wrap_err("failed to read the notice response body")?;
    println!("HTTP {status}");
    if !body.is_empty() {
        println!("{body}");
    }
    if !status.is_success() {
        return Err(eyre!("server rejected the notice with {status}"));
    }
    Ok(())
}

fn cmd_render(config_path: Option<&Path>, record_args: &RecordArgs, target: &TargetArgs) -> Result<()> {
    let resolved = effective_config(config_path, target)?.resolve()?;
    let record = record_args.to_record();
    let options = NoticeOptions::new(resolved).with_request(record_args.to_request());
    println!("{}", Notice::new(&record, &options).to_xml());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => {
            let path = config_file_path()?;
            info!(path = %path.display(), "reading config");
            load_config()?
        }
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    match config.resolve() {
        Ok(resolved) => println!(
            "# resolved: {}://{}:{} writer={} environment={}",
            if resolved.secure { "https" } else { "http" },
            resolved.host,
            resolved.port,
            resolved.default_writer,
            resolved.environment_name
        ),
        Err(e) => println!("# incomplete: {e}"),
    }
    Ok(())
}
