//! Session lifecycle: the token pair, its persistence helpers, the error
//! taxonomy and the refresh manager that ties them to the identity provider.

mod error;
mod manager;
mod report;
mod token;

pub use error::SessionError;
pub use manager::{
    RequestOptions, SessionRefreshManager, SessionState, DEFAULT_REFRESH_INTERVAL,
};
pub use report::RefreshReport;
pub use token::{
    clear_pair, load_access_token, load_pair, load_refresh_token, save_pair, TokenPair,
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
