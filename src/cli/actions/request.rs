use crate::cli::globals::GlobalArgs;
use crate::session::{RequestOptions, SessionError};
use anyhow::{bail, Result};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub target: String,
    pub method: Method,
    pub body: Option<Value>,
}

/// Sends one authenticated request and prints the response body.
///
/// # Errors
/// Returns an error if the session expired, the request could not be sent,
/// or the final response is not 2xx.
pub async fn execute(args: Args) -> Result<()> {
    let manager = args.globals.manager()?;

    let options = RequestOptions {
        method: args.method,
        body: args.body,
        headers: Vec::new(),
    };

    let response = match manager
        .make_authenticated_request(&args.target, &options)
        .await
    {
        Ok(response) => response,
        Err(SessionError::SessionExpired) => {
            bail!("session expired, run `sessionkeeper login`")
        }
        Err(e) => return Err(e.into()),
    };

    let status = response.status();
    debug!(%status, "response received");

    let body = response.text().await?;
    println!("{body}");

    if !status.is_success() {
        bail!("request failed with status {status}");
    }

    Ok(())
}
