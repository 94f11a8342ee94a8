use std::io::{BufRead, Write};

use anyhow::{Context as _, bail};
use tracing::{info, warn};

use crate::cli::LoginArgs;
use crate::context::Context;

pub async fn login(ctx: &Context, args: LoginArgs) -> anyhow::Result<()> {
    let email = match args.email.filter(|e| !e.trim().is_empty()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let password = match args.password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").context("reading the password")?,
    };
    if email.is_empty() || password.is_empty() {
        bail!("email and password are required");
    }
    let device_name = args
        .device_name
        .unwrap_or_else(|| ctx.settings.device_name.clone());

    println!("Logging in to PrismDrive...");
    let client = ctx.api_client(None)?;
    let store = &ctx.auth.token_store;
    match client.login(&email, &password, &device_name).await {
        Ok(token) => {
            store
                .save(token.expose())
                .context("saving the access token")?;
            info!(email = %email, "logged in");
            println!("✓ Login successful. Token saved to {}", store.path().display());
            Ok(())
        }
        Err(e) => {
            if let Err(clear) = store.clear() {
                warn!(error = %clear, "failed to clear stored token");
            }
            Err(e).context("login failed")
        }
    }
}

pub fn logout(ctx: &Context) -> anyhow::Result<()> {
    ctx.auth
        .token_store
        .clear()
        .context("removing the stored token")?;
    println!("✓ Logged out.");
    Ok(())
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(line.trim().to_string())
}
