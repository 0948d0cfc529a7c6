use crate::provider::{
    DEFAULT_HEALTH_PATH, DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH,
};
use clap::{Arg, Command};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STORE: &str = "store";
pub const ARG_REFRESH_INTERVAL: &str = "refresh-interval";
pub const ARG_CSRF_TOKEN: &str = "csrf-token";
pub const ARG_REFRESH_PATH: &str = "refresh-path";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_LOGOUT_PATH: &str = "logout-path";
pub const ARG_HEALTH_PATH: &str = "health-path";
pub const ARG_READY_TIMEOUT: &str = "ready-timeout";

pub const DEFAULT_STORE: &str = ".sessionkeeper/tokens.json";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Identity provider base URL, example: https://auth.example.com")
                .env("SESSIONKEEPER_API_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_STORE)
                .long(ARG_STORE)
                .help("Path of the JSON file holding the token pair")
                .default_value(DEFAULT_STORE)
                .env("SESSIONKEEPER_STORE"),
        )
        .arg(
            Arg::new(ARG_REFRESH_INTERVAL)
                .long(ARG_REFRESH_INTERVAL)
                .help("Seconds between a token refresh and the next one")
                .default_value("3000")
                .env("SESSIONKEEPER_REFRESH_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CSRF_TOKEN)
                .long(ARG_CSRF_TOKEN)
                .help("CSRF token sent as X-CSRF-Token on refresh, login and logout")
                .env("SESSIONKEEPER_CSRF_TOKEN"),
        )
        .arg(
            Arg::new(ARG_REFRESH_PATH)
                .long(ARG_REFRESH_PATH)
                .help("Refresh endpoint path")
                .default_value(DEFAULT_REFRESH_PATH)
                .env("SESSIONKEEPER_REFRESH_PATH"),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Login endpoint path")
                .default_value(DEFAULT_LOGIN_PATH)
                .env("SESSIONKEEPER_LOGIN_PATH"),
        )
        .arg(
            Arg::new(ARG_LOGOUT_PATH)
                .long(ARG_LOGOUT_PATH)
                .help("Logout endpoint path")
                .default_value(DEFAULT_LOGOUT_PATH)
                .env("SESSIONKEEPER_LOGOUT_PATH"),
        )
        .arg(
            Arg::new(ARG_HEALTH_PATH)
                .long(ARG_HEALTH_PATH)
                .help("Health endpoint path, probed before watching")
                .default_value(DEFAULT_HEALTH_PATH)
                .env("SESSIONKEEPER_HEALTH_PATH"),
        )
        .arg(
            Arg::new(ARG_READY_TIMEOUT)
                .long(ARG_READY_TIMEOUT)
                .help("Seconds to wait for the provider to become ready")
                .default_value("30")
                .env("SESSIONKEEPER_READY_TIMEOUT")
                .value_parser(clap::value_parser!(u64)),
        )
}
