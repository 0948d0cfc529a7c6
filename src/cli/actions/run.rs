use crate::cli::actions::{request, session, watch, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => session::login(args).await,
        Action::Refresh(globals) => session::refresh(&globals).await,
        Action::Logout(globals) => session::logout(&globals).await,
        Action::Status(globals) => session::status(&globals),
        Action::Request(args) => request::execute(args).await,
        Action::Watch(globals) => watch::execute(&globals).await,
    }
}
