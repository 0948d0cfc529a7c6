pub mod logging;
pub mod provider;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_LOGIN: &str = "login";
pub const CMD_REFRESH: &str = "refresh";
pub const CMD_LOGOUT: &str = "logout";
pub const CMD_STATUS: &str = "status";
pub const CMD_REQUEST: &str = "request";
pub const CMD_WATCH: &str = "watch";

fn login() -> Command {
    Command::new(CMD_LOGIN)
        .about("Sign in and store the issued token pair")
        .arg(
            Arg::new("email")
                .long("email")
                .help("Account email")
                .env("SESSIONKEEPER_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Account password")
                .env("SESSIONKEEPER_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}

fn request() -> Command {
    Command::new(CMD_REQUEST)
        .about("Send an authenticated request, refreshing the session once on 401")
        .arg(
            Arg::new("url")
                .help("Absolute URL or path below the API base URL")
                .required(true),
        )
        .arg(
            Arg::new("method")
                .short('X')
                .long("method")
                .help("HTTP method")
                .default_value("GET"),
        )
        .arg(
            Arg::new("data")
                .short('d')
                .long("data")
                .help("JSON request body"),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("sessionkeeper")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .subcommand(login())
        .subcommand(Command::new(CMD_REFRESH).about("Refresh the stored token pair now"))
        .subcommand(
            Command::new(CMD_LOGOUT).about("Sign out and remove the stored token pair"),
        )
        .subcommand(Command::new(CMD_STATUS).about("Show build and session information"))
        .subcommand(request())
        .subcommand(
            Command::new(CMD_WATCH)
                .about("Keep the stored session refreshed until interrupted"),
        );

    let command = provider::with_args(command);
    logging::with_args(command)
}
