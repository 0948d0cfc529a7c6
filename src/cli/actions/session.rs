use crate::cli::globals::GlobalArgs;
use crate::session::RefreshReport;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

#[derive(Debug)]
pub struct LoginArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

/// # Errors
/// Returns an error if the provider rejects the credentials or the store fails.
pub async fn login(args: LoginArgs) -> Result<()> {
    let manager = args.globals.manager()?;

    manager
        .sign_in(&args.email, args.password.expose_secret())
        .await?;

    println!("signed in as {}", args.email);

    Ok(())
}

/// Refreshes now and prints the outcome as JSON, without token values.
///
/// # Errors
/// Returns an error if the refresh failed; both tokens are gone by then.
pub async fn refresh(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;

    let result = manager.refresh_access_token().await;
    let report = RefreshReport::from(&result).without_tokens();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode refresh report")?
    );

    result.map(|_| ()).map_err(|e| {
        if e.requires_sign_in() {
            anyhow::anyhow!("{e}, run `sessionkeeper login`")
        } else {
            e.into()
        }
    })
}

/// # Errors
/// Returns an error if the store cannot be cleared.
pub async fn logout(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;

    manager.sign_out().await?;

    println!("signed out");

    Ok(())
}

/// # Errors
/// Returns an error if the store cannot be read.
pub fn status(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;

    debug!(store = %globals.store_path.display(), "reading session status");

    let session = if manager.is_authenticated()? {
        "signed in"
    } else {
        "signed out"
    };

    println!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    );
    println!("user agent:       {}", crate::APP_USER_AGENT);
    println!("api url:          {}", globals.api_url);
    println!("store:            {}", globals.store_path.display());
    println!(
        "refresh interval: {}s",
        globals.refresh_interval.as_secs()
    );
    println!("session:          {session}");

    Ok(())
}
