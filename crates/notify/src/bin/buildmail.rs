//! buildmail — send build-result emails and preview their log excerpts.
//!
//! Subcommands:
//! - `send` — deliver one email through the configured transport
//! - `format-log` — print the email excerpt of a job log
//! - `elapsed` — print the duration between two millisecond timestamps

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use buildmail_notify::notifier::split_recipients;
use buildmail_notify::{
    config, elapsed_time, format_stdmerged, Email, EmailFormat, MailerConfig, Notifier,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Build-result email notifier.
#[derive(Parser, Debug)]
#[command(name = "buildmail", version, about)]
struct Cli {
    /// Path to a TOML mailer config. Falls back to SMTP_* env vars.
    #[arg(long, global = true, env = "BUILDMAIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one email.
    Send {
        /// Recipient address; repeat or comma-separate for several.
        #[arg(long, required = true)]
        to: Vec<String>,

        #[arg(long)]
        subject: String,

        /// File holding the plaintext body (`-` for stdin).
        #[arg(long)]
        text: Option<PathBuf>,

        /// File holding the HTML body (`-` for stdin).
        #[arg(long)]
        html: Option<PathBuf>,

        /// Sender address; defaults to `smtp.from` in the config.
        #[arg(long)]
        from: Option<String>,
    },

    /// Print the email excerpt of a job log.
    FormatLog {
        /// Log file (`-` for stdin).
        path: PathBuf,

        /// `plaintext`, anything else renders HTML. Defaults to
        /// `email_format` from the config.
        #[arg(long)]
        format: Option<EmailFormat>,
    },

    /// Print the duration between two millisecond timestamps.
    Elapsed { start_ms: i64, finish_ms: i64 },
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MailerConfig> {
    let cfg = match path {
        Some(p) => MailerConfig::load(p)?,
        None => MailerConfig::from_env(),
    };
    cfg.log_summary();
    Ok(cfg)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Send {
            to,
            subject,
            text,
            html,
            from,
        } => {
            let notifier = Notifier::new(load_config(cli.config.as_deref())?);
            info!(transport = notifier.transport_name(), "mailer ready");

            let recipients = to.iter().flat_map(|list| split_recipients(list)).collect();
            let mut email = Email::with_recipients(recipients, subject);
            if let Some(path) = text {
                email = email.text(read_input(&path)?);
            }
            if let Some(path) = html {
                email = email.html(read_input(&path)?);
            }
            if let Some(sender) = from {
                email = email.from(sender);
            }

            let response = notifier.send(email).await?;
            info!(
                message_id = response.message_id.as_deref().unwrap_or("-"),
                code = response.code.as_deref().unwrap_or("-"),
                "send finished"
            );
            if let Some(message) = response.message {
                println!("{message}");
            }
        }
        Command::FormatLog { path, format } => {
            let format = match format {
                Some(format) => format,
                None => load_config(cli.config.as_deref())?.email_format,
            };
            let log = read_input(&path)?;
            print!("{}", format_stdmerged(&log, format));
        }
        Command::Elapsed {
            start_ms,
            finish_ms,
        } => {
            println!("{}", elapsed_time(start_ms, finish_ms));
        }
    }

    Ok(())
}
