//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Send email through an SMTP account")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message from an account.
    Send(SendCmd),
    /// Encrypt a password read from stdin for a login account.
    Encrypt,
    /// Check an account file without connecting.
    Validate(ValidateCmd),
    /// Grant an `OAuth2` account its first token through the consent page.
    Authorize(AuthorizeCmd),
}

#[derive(Args, Debug)]
pub struct SendCmd {
    /// Account JSON file. Refreshed tokens are written back to it.
    #[arg(long)]
    pub account: PathBuf,
    /// Message JSON file.
    #[arg(long)]
    pub message: PathBuf,
    /// Print the send report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ValidateCmd {
    /// Account JSON file.
    #[arg(long)]
    pub account: PathBuf,
}

#[derive(Args, Debug)]
pub struct AuthorizeCmd {
    /// Account JSON file. The granted token is written back to it.
    #[arg(long)]
    pub account: PathBuf,
    /// Redirect URI registered with the provider.
    #[arg(long, default_value = "http://localhost")]
    pub redirect_uri: String,
    /// Authorization code from the redirect. Read from stdin when omitted.
    #[arg(long)]
    pub code: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from([
            "courier",
            "send",
            "--account",
            "a.json",
            "--message",
            "m.json",
        ])
        .unwrap();
        let Command::Send(cmd) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(cmd.account, PathBuf::from("a.json"));
        assert!(!cmd.json);
    }

    #[test]
    fn send_requires_message() {
        assert!(Cli::try_parse_from(["courier", "send", "--account", "a.json"]).is_err());
    }

    #[test]
    fn parses_authorize() {
        let cli = Cli::try_parse_from(["courier", "authorize", "--account", "a.json"]).unwrap();
        let Command::Authorize(cmd) = cli.command else {
            panic!("expected authorize");
        };
        assert_eq!(cmd.redirect_uri, "http://localhost");
        assert_eq!(cmd.code, None);

        let cli = Cli::try_parse_from([
            "courier",
            "authorize",
            "--account",
            "a.json",
            "--redirect-uri",
            "http://localhost:8080/cb",
            "--code",
            "abc",
        ])
        .unwrap();
        let Command::Authorize(cmd) = cli.command else {
            panic!("expected authorize");
        };
        assert_eq!(cmd.redirect_uri, "http://localhost:8080/cb");
        assert_eq!(cmd.code.as_deref(), Some("abc"));
    }

    #[test]
    fn verify_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
