//! `courier` - send email through a configured SMTP account.
//!
//! Engine settings come from `COURIER_*` environment variables; accounts and
//! messages are JSON files.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod authorize;
mod cli;
mod store;

use anyhow::Context;
use clap::Parser;
use courier_core::{EmailSender, EngineConfig, FromEnv, validate_account};
use courier_mime::EmailMessage;
use courier_oauth::Endpoints;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authorize::Grant;
use cli::{AuthorizeCmd, Cli, Command, SendCmd, ValidateCmd};
use store::{AccountFileStore, load_account};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,courier_core=info,courier_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Send(cmd) => send(cmd).await,
        Command::Encrypt => encrypt().await,
        Command::Validate(cmd) => validate(cmd).await,
        Command::Authorize(cmd) => authorize(cmd).await,
    }
}

async fn send(cmd: SendCmd) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let mut account = load_account(&cmd.account).await?;
    let raw = tokio::fs::read_to_string(&cmd.message)
        .await
        .with_context(|| format!("reading {}", cmd.message.display()))?;
    let message: EmailMessage = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", cmd.message.display()))?;

    let sender = EmailSender::new(&config, AccountFileStore::new(&cmd.account))?;
    info!(account = %account.id, to = message.to(), "sending");

    match sender.send(&mut account, &message).await {
        Ok(report) => {
            if cmd.json {
                let json = serde_json::json!({
                    "refreshed_token": report.refreshed_token,
                    "accepted_recipients": report.accepted_recipients,
                });
                println!("{json}");
            } else {
                println!("sent to {} recipient(s)", report.accepted_recipients);
            }
            Ok(())
        }
        Err(e) => {
            error!(account = %account.id, kind = ?e.kind(), transient = e.is_transient(), "send failed");
            Err(e.into())
        }
    }
}

async fn encrypt() -> anyhow::Result<()> {
    let cipher = EngineConfig::from_env()?.cipher()?;
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading stdin")?;
    println!("{}", cipher.encrypt(input.trim_end_matches(['\r', '\n']))?);
    Ok(())
}

async fn validate(cmd: ValidateCmd) -> anyhow::Result<()> {
    let account = load_account(&cmd.account).await?;
    match validate_account(&account) {
        Ok(()) => {
            println!("{}: ok ({})", account.name, account.authentication().kind());
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("{}: {}", e.field(), e.message());
            }
            anyhow::bail!("{} invalid field(s)", errors.len())
        }
    }
}

async fn authorize(cmd: AuthorizeCmd) -> anyhow::Result<()> {
    let account = load_account(&cmd.account).await?;
    let grant = Grant::new(&account, &Endpoints::from_env()?)?;

    let code = match cmd.code {
        Some(code) => code,
        None => {
            eprintln!("Open this URL, approve access, then paste the `code` from the redirect:");
            println!("{}", grant.consent_url(&cmd.redirect_uri));
            let mut line = String::new();
            tokio::io::BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .context("reading authorization code")?;
            line
        }
    };
    if code.trim().is_empty() {
        anyhow::bail!("no authorization code given");
    }

    let state = grant.complete(&cmd.account, &code, &cmd.redirect_uri).await?;
    println!("authorized {} (token valid until {})", account.name, state.expires_at);
    Ok(())
}
