use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::io::{IsTerminal, Write};

/// Production Epson Connect endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.epsonconnect.com";

/// Epson Connect client - authenticate a printer and call the printing API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the Epson Connect API
    #[arg(short = 'u', long, env = "EPSON_CONNECT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Email address assigned to the printer
    #[arg(short = 'e', long, env = "EPSON_PRINTER_EMAIL")]
    pub printer_email: Option<String>,

    /// Client ID for API access
    #[arg(long, env = "EPSON_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret for API access
    #[arg(long, env = "EPSON_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Authenticate and print the device id and token expiry
    Login,

    /// Send an authenticated request and print the response
    Send {
        /// HTTP method (GET, POST, DELETE, ...)
        method: String,

        /// Request path; `{device_id}` is replaced with the current subject id
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Authenticate, then unregister the subject on the server
    Deauth,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Account
    pub base_url: String,
    pub printer_email: String,
    pub client_id: String,
    pub client_secret: String,

    // Token lifecycle
    pub token_refresh_threshold: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,

    pub command: Command,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut args = CliArgs::parse();

        if needs_interactive_setup(&args) {
            let answers = run_interactive_setup(&args.base_url)?;
            args.base_url = answers.base_url;
            args.printer_email = Some(answers.printer_email);
            args.client_id = Some(answers.client_id);
            args.client_secret = Some(answers.client_secret);
        }

        Self::from_args(args)
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            base_url: args.base_url.trim_end_matches('/').to_string(),

            printer_email: args.printer_email.context(
                "EPSON_PRINTER_EMAIL is required (use -e or set EPSON_PRINTER_EMAIL env var)",
            )?,

            client_id: args
                .client_id
                .context("EPSON_CLIENT_ID is required (use --client-id or set EPSON_CLIENT_ID env var)")?,

            client_secret: args.client_secret.context(
                "EPSON_CLIENT_SECRET is required (use --client-secret or set EPSON_CLIENT_SECRET env var)",
            )?,

            token_refresh_threshold: std::env::var("TOKEN_REFRESH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,

            command: args.command,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            anyhow::bail!(
                "EPSON_CONNECT_BASE_URL must start with http:// or https://: {}",
                self.base_url
            );
        }

        for (name, value) in [
            ("EPSON_PRINTER_EMAIL", &self.printer_email),
            ("EPSON_CLIENT_ID", &self.client_id),
            ("EPSON_CLIENT_SECRET", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        Ok(())
    }
}

// === Interactive Setup ===

/// Interactive setup runs on a terminal when there is no .env file and credentials are missing
fn needs_interactive_setup(args: &CliArgs) -> bool {
    let env_file_exists = std::path::Path::new(".env").exists();
    let missing = args.printer_email.is_none()
        || args.client_id.is_none()
        || args.client_secret.is_none();

    !env_file_exists && missing && std::io::stdin().is_terminal()
}

/// Answers collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub base_url: String,
    pub printer_email: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Prompt for the account credentials
fn run_interactive_setup(default_base_url: &str) -> Result<InteractiveConfig> {
    eprintln!();
    eprintln!("No configuration found. Let's set up your Epson Connect account.");
    eprintln!();

    let printer_email: String = Input::new()
        .with_prompt("Printer email address (EPSON_PRINTER_EMAIL)")
        .interact_text()
        .context("Failed to read EPSON_PRINTER_EMAIL")?;

    let client_id: String = Input::new()
        .with_prompt("Client ID (EPSON_CLIENT_ID)")
        .interact_text()
        .context("Failed to read EPSON_CLIENT_ID")?;

    let client_secret: String = Password::new()
        .with_prompt("Client secret (EPSON_CLIENT_SECRET)")
        .interact()
        .context("Failed to read EPSON_CLIENT_SECRET")?;

    if client_secret.is_empty() {
        anyhow::bail!("EPSON_CLIENT_SECRET cannot be empty");
    }

    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(default_base_url.to_string())
        .interact_text()
        .context("Failed to read base URL")?;

    let config = InteractiveConfig {
        base_url,
        printer_email,
        client_id,
        client_secret,
    };

    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
        file.write_all(render_env_file(&config).as_bytes())
            .context("Failed to write .env file")?;
        eprintln!("Configuration saved to .env file");
    }

    Ok(config)
}

/// Contents of a .env file for the given answers
fn render_env_file(config: &InteractiveConfig) -> String {
    format!(
        r#"# Epson Connect Configuration
# Generated by interactive setup

EPSON_CONNECT_BASE_URL={}
EPSON_PRINTER_EMAIL={}
EPSON_CLIENT_ID={}
EPSON_CLIENT_SECRET={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL=info
"#,
        config.base_url, config.printer_email, config.client_id, config.client_secret,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec![
            "epson-connect",
            "--base-url",
            "https://api.example.test/",
            "--printer-email",
            "printer@example.test",
            "--client-id",
            "client",
            "--client-secret",
            "secret",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_from_args_login() {
        let config = Config::from_args(parse(&["login"])).unwrap();
        assert_eq!(config.base_url, "https://api.example.test");
        assert_eq!(config.printer_email, "printer@example.test");
        assert_eq!(config.client_id, "client");
        assert_eq!(config.client_secret, "secret");
        assert_eq!(config.http_request_timeout, 60);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.command, Command::Login);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_send_command_arguments() {
        let args = parse(&[
            "send",
            "POST",
            "/api/1/printing/printers/{device_id}/jobs",
            "--data",
            r#"{"job_name":"test"}"#,
        ]);
        assert_eq!(
            args.command,
            Command::Send {
                method: "POST".to_string(),
                path: "/api/1/printing/printers/{device_id}/jobs".to_string(),
                data: Some(r#"{"job_name":"test"}"#.to_string()),
            }
        );
    }

    #[test]
    fn test_missing_client_id_is_error() {
        let mut args = CliArgs::try_parse_from([
            "epson-connect",
            "--printer-email",
            "printer@example.test",
            "--client-secret",
            "secret",
            "deauth",
        ])
        .unwrap();
        args.client_id = None;

        let err = Config::from_args(args).unwrap_err();
        assert!(err.to_string().contains("EPSON_CLIENT_ID is required"));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::from_args(parse(&["login"])).unwrap();
        config.base_url = "api.example.test".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let mut config = Config::from_args(parse(&["login"])).unwrap();
        config.client_secret = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("EPSON_CLIENT_SECRET"));
    }

    #[test]
    fn test_render_env_file() {
        let content = render_env_file(&InteractiveConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            printer_email: "printer@example.test".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        });
        assert!(content.contains("EPSON_CONNECT_BASE_URL=https://api.epsonconnect.com\n"));
        assert!(content.contains("EPSON_PRINTER_EMAIL=printer@example.test\n"));
        assert!(content.contains("EPSON_CLIENT_ID=client\n"));
        assert!(content.contains("EPSON_CLIENT_SECRET=secret\n"));
    }
}
