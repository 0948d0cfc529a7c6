use crate::cli::globals::GlobalArgs;
use anyhow::{bail, Result};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// How often the watcher checks that the session still exists.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps the stored session refreshed until ctrl-c, or until a refresh fails
/// and the session is gone.
///
/// # Errors
/// Returns an error if the provider never becomes ready, no session is
/// stored, or the session ends while watching.
pub async fn execute(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;

    manager.wait_for_provider(globals.ready_timeout).await?;

    if !manager.initialize_token_management()? {
        bail!("no stored session, run `sessionkeeper login` first");
    }

    info!(
        interval = globals.refresh_interval.as_secs(),
        "watching session, press ctrl-c to stop"
    );

    let mut ticker = interval(SESSION_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("interrupted, stopping watcher");
                break Ok(());
            }
            _ = ticker.tick() => {
                if !manager.is_authenticated()? {
                    break Err(anyhow::anyhow!(
                        "session ended, run `sessionkeeper login` to sign in again"
                    ));
                }
            }
        }
    };

    manager.cancel_scheduled_refresh();

    outcome
}
