use anyhow::{Context, Result};
use reqwest::Method;
use std::sync::Arc;

use epson_connect::auth::{AuthContext, Credentials};
use epson_connect::config::{Command, Config};
use epson_connect::http_client::ReqwestTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Logs go to stderr; stdout carries command output only
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Using Epson Connect API at {}", config.base_url);

    let transport = Arc::new(ReqwestTransport::new(
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);

    let credentials = Credentials::new(
        config.base_url.clone(),
        config.printer_email.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    );

    let context = AuthContext::with_transport(credentials, transport)
        .with_refresh_threshold(config.token_refresh_threshold);

    let output = match config.command {
        Command::Login => {
            context.initialize().await?;
            serde_json::json!({
                "device_id": context.device_id().await,
                "expires_at": context.expires_at().await.to_rfc3339(),
            })
        }

        Command::Send { method, path, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;

            let data = data
                .map(|d| serde_json::from_str(&d))
                .transpose()
                .context("--data must be valid JSON")?;

            // Authenticate up front so {device_id} can be resolved
            context.initialize().await?;
            let path = expand_path(&path, &context.device_id().await);

            context.send(method, &path, data, None, None).await?
        }

        Command::Deauth => context.deauthenticate().await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Substitute the `{device_id}` placeholder in a request path
fn expand_path(path: &str, device_id: &str) -> String {
    path.replace("{device_id}", device_id)
}
