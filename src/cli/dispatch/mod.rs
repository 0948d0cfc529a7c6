use crate::cli::{
    actions::{request, session::LoginArgs, Action},
    commands::{self, provider as args},
    globals::GlobalArgs,
};
use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::Method;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// # Errors
/// Returns an error if the API URL is not an absolute http(s) URL.
pub fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid API URL: {raw}"))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => bail!("unsupported API URL scheme: {scheme}"),
    }
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let api_url = matches
        .get_one::<String>(args::ARG_API_URL)
        .context("missing required argument: --api-url")?;

    let mut globals = GlobalArgs::new(parse_api_url(api_url)?);

    if let Some(store) = matches.get_one::<String>(args::ARG_STORE) {
        globals.store_path = PathBuf::from(store);
    }
    if let Some(secs) = matches.get_one::<u64>(args::ARG_REFRESH_INTERVAL) {
        globals.refresh_interval = Duration::from_secs(*secs);
    }
    if let Some(secs) = matches.get_one::<u64>(args::ARG_READY_TIMEOUT) {
        globals.ready_timeout = Duration::from_secs(*secs);
    }
    globals.csrf_token = matches
        .get_one::<String>(args::ARG_CSRF_TOKEN)
        .filter(|token| !token.is_empty())
        .map(|token| SecretString::from(token.clone()));

    for (arg, slot) in [
        (args::ARG_REFRESH_PATH, &mut globals.refresh_path),
        (args::ARG_LOGIN_PATH, &mut globals.login_path),
        (args::ARG_LOGOUT_PATH, &mut globals.logout_path),
        (args::ARG_HEALTH_PATH, &mut globals.health_path),
    ] {
        if let Some(path) = matches.get_one::<String>(arg) {
            slot.clone_from(path);
        }
    }

    Ok(globals)
}

/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    match matches.subcommand() {
        Some((commands::CMD_LOGIN, sub)) => {
            let email = sub
                .get_one::<String>("email")
                .map(|email| email.trim().to_string())
                .context("missing required argument: --email")?;

            if !valid_email(&email) {
                bail!("invalid email address: {email}");
            }

            let password = sub
                .get_one::<String>("password")
                .filter(|password| !password.is_empty())
                .context("missing required argument: --password")?;

            Ok(Action::Login(LoginArgs {
                globals,
                email,
                password: SecretString::from(password.clone()),
            }))
        }
        Some((commands::CMD_REFRESH, _)) => Ok(Action::Refresh(globals)),
        Some((commands::CMD_LOGOUT, _)) => Ok(Action::Logout(globals)),
        Some((commands::CMD_STATUS, _)) => Ok(Action::Status(globals)),
        Some((commands::CMD_REQUEST, sub)) => {
            let target = sub
                .get_one::<String>("url")
                .cloned()
                .context("missing required argument: <url>")?;

            let method = sub
                .get_one::<String>("method")
                .map_or("GET", String::as_str);
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| anyhow!("invalid HTTP method: {method}"))?;

            let body = sub
                .get_one::<String>("data")
                .map(|data| serde_json::from_str(data).context("--data must be valid JSON"))
                .transpose()?;

            Ok(Action::Request(request::Args {
                globals,
                target,
                method,
                body,
            }))
        }
        Some((commands::CMD_WATCH, _)) => Ok(Action::Watch(globals)),
        _ => Err(anyhow!("unknown subcommand")),
    }
}
