//! Connecting to the configured instance

use anyhow::{Context, Result, bail};
use is_terminal::IsTerminal;

use crate::api::DirectusClient;
use crate::config::Config;

/// Build a client and authenticate with a token or email/password.
///
/// The password is prompted for when only an email is configured and stdin
/// is a terminal.
pub async fn connect(config: &Config) -> Result<DirectusClient> {
    let mut client = DirectusClient::new(&config.url, config.client_config())
        .context("Failed to create Directus client")?;

    if let Some(token) = &config.token {
        log::debug!("Using static token for {}", client.url());
        return Ok(client.with_token(token.clone()));
    }

    match &config.email {
        Some(email) => {
            let password = match &config.password {
                Some(password) => password.clone(),
                None => prompt_password(email)?,
            };
            client
                .login(email, &password)
                .await
                .with_context(|| format!("Failed to log in to {}", config.url))?;
        }
        None => log::warn!("No credentials configured, using the public role"),
    }

    Ok(client)
}

fn prompt_password(email: &str) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        bail!("No password for {} and stdin is not a terminal; set DIRECTUS_PASSWORD", email);
    }
    rpassword::prompt_password(format!("Directus password for {}: ", email))
        .context("Failed to read password")
}
