pub mod request;
pub mod session;
pub mod watch;

// Single dispatch point; see `run::execute`.
mod run;

use crate::cli::globals::GlobalArgs;

#[derive(Debug)]
pub enum Action {
    Login(session::LoginArgs),
    Refresh(GlobalArgs),
    Logout(GlobalArgs),
    Status(GlobalArgs),
    Request(request::Args),
    Watch(GlobalArgs),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
