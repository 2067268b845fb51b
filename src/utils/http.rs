// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::redirect;

use crate::error::Result;
use crate::models::FetcherConfig;
use crate::utils::url::UrlPolicy;

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// Create the asynchronous HTTP client used for list fetching.
///
/// Redirects are followed, but every hop is re-checked against the
/// URL policy so a public source cannot bounce the fetcher to an
/// internal address.
pub fn create_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let policy = UrlPolicy::from_config(config);
    let redirect_policy = redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
        }
        match policy.check(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(reason) => attempt.error(format!("redirect refused: {reason}")),
        }
    });

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(redirect_policy)
        .build()?;
    Ok(client)
}

/// Create a small client for side channels such as error reporting.
pub fn create_reporting_client(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?;
    Ok(client)
}
